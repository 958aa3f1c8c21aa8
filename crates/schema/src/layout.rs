use crate::bbox::{BoundingBox, PixelRect};
use crate::detection::Detection;
use serde::{Deserialize, Serialize};

/// A detected table and the cell detections assigned to it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Table {
    pub label: String,
    #[serde(with = "as_rect")]
    pub bbox: BoundingBox,
    pub score: f32,
    pub cells: Vec<Cell>,
}

/// Cell inside a table, boxes serialized in `{left, top, width, height}` form.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Cell {
    #[serde(with = "as_rect")]
    pub bbox: BoundingBox,
    pub score: f32,
}

impl From<&Detection> for Cell {
    fn from(det: &Detection) -> Self {
        Self {
            bbox: det.bbox,
            score: det.score,
        }
    }
}

/// All tables found on one page image.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Page {
    pub page_num: u32,
    #[serde(with = "as_rect")]
    pub bbox: BoundingBox,
    pub tables: Vec<Table>,
    /// Cell detections that no table contained.
    pub loose_cells: Vec<Cell>,
}

impl Page {
    pub fn cell_count(&self) -> usize {
        self.tables.iter().map(|t| t.cells.len()).sum::<usize>() + self.loose_cells.len()
    }
}

mod as_rect {
    use super::{BoundingBox, PixelRect};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(b: &BoundingBox, s: S) -> Result<S::Ok, S::Error> {
        b.to_rect().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BoundingBox, D::Error> {
        let r = PixelRect::deserialize(d)?;
        Ok(BoundingBox::new(
            r.left,
            r.top,
            r.left + r.width,
            r.top + r.height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_serializes_rects() {
        let page = Page {
            page_num: 3,
            bbox: BoundingBox::new(0.0, 0.0, 800.0, 600.0),
            tables: vec![Table {
                label: "Bordered".to_string(),
                bbox: BoundingBox::new(10.0, 20.0, 110.0, 220.0),
                score: 0.9,
                cells: vec![Cell {
                    bbox: BoundingBox::new(12.0, 22.0, 50.0, 40.0),
                    score: 0.8,
                }],
            }],
            loose_cells: vec![],
        };

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["page_num"], 3);
        assert_eq!(json["bbox"]["width"], 800.0);
        assert_eq!(json["tables"][0]["bbox"]["left"], 10.0);
        assert_eq!(json["tables"][0]["bbox"]["height"], 200.0);
        assert_eq!(json["tables"][0]["cells"][0]["bbox"]["width"], 38.0);

        let back: Page = serde_json::from_value(json).unwrap();
        assert_eq!(back, page);
        assert_eq!(back.cell_count(), 1);
    }
}
