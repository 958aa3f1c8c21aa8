use crate::config::ServiceConfig;

pub fn setup_logging(config: &ServiceConfig) -> anyhow::Result<()> {
    common::setup_logging(config.environment, "info")
}
