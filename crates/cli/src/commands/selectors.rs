//! Selectors command

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use vybe_visual::AuditConfig;

use crate::output::{print_info, print_list, OutputFormat, TableDisplay};

#[derive(Serialize)]
pub struct SelectorDisplay {
    pub name: String,
    pub selector: String,
}

impl TableDisplay for SelectorDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Selector"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.name.clone(), self.selector.clone()]
    }
}

pub fn execute(config_path: &Path, format: OutputFormat) -> Result<()> {
    let config = AuditConfig::load(config_path)?;
    config.selectors.validate()?;

    let displays: Vec<SelectorDisplay> = config
        .selectors
        .entries
        .iter()
        .map(|e| SelectorDisplay {
            name: e.name.clone(),
            selector: e.selector.clone(),
        })
        .collect();

    if matches!(format, OutputFormat::Table) {
        print_info(&format!("Selector set v{}", config.selectors.version));
    }
    print_list(&displays, format);

    Ok(())
}
