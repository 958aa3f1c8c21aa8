//! Grouping of cell detections into the tables that contain them.

use crate::architecture::LayoutConfig;
use crate::processing::nms::sort_by_score_desc;
use schema::{BoundingBox, Cell, Detection, Page, Table};
use std::cmp::Ordering;

fn reading_order(a: &BoundingBox, b: &BoundingBox) -> Ordering {
    a.y_min
        .total_cmp(&b.y_min)
        .then_with(|| a.x_min.total_cmp(&b.x_min))
}

/// Build the page layout for one image's detections.
///
/// Every detection not carrying the cell label is a table. A cell goes to
/// the highest-scoring table holding at least `min_cell_overlap` of its
/// area, otherwise it is loose. Tables and cells come out in reading order.
pub fn group_tables(
    detections: &[Detection],
    layout: &LayoutConfig,
    page_num: u32,
    width: u32,
    height: u32,
) -> Page {
    let (cells, tables): (Vec<&Detection>, Vec<&Detection>) = detections
        .iter()
        .partition(|d| d.label == layout.cell_label);

    let table_scores: Vec<f32> = tables.iter().map(|t| t.score).collect();
    let by_score = sort_by_score_desc(&table_scores);

    let mut assigned: Vec<Vec<Cell>> = vec![Vec::new(); tables.len()];
    let mut loose_cells = Vec::new();

    for cell in cells {
        let owner = by_score
            .iter()
            .copied()
            .find(|&t| cell.bbox.fraction_inside(&tables[t].bbox) >= layout.min_cell_overlap);
        match owner {
            Some(t) => assigned[t].push(Cell::from(cell)),
            None => loose_cells.push(Cell::from(cell)),
        }
    }

    let mut tables: Vec<Table> = tables
        .into_iter()
        .zip(assigned)
        .map(|(t, mut cells)| {
            cells.sort_by(|a, b| reading_order(&a.bbox, &b.bbox));
            Table {
                label: t.label.clone(),
                bbox: t.bbox,
                score: t.score,
                cells,
            }
        })
        .collect();
    tables.sort_by(|a, b| reading_order(&a.bbox, &b.bbox));
    loose_cells.sort_by(|a, b| reading_order(&a.bbox, &b.bbox));

    tracing::debug!(
        page_num,
        tables = tables.len(),
        loose_cells = loose_cells.len(),
        "Page grouped"
    );

    Page {
        page_num,
        bbox: BoundingBox::new(0.0, 0.0, width as f32, height as f32),
        tables,
        loose_cells,
    }
}
