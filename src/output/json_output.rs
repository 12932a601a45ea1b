//! JSON export
//!
//! Roots are written as a pretty-printed array; crawled children are nested
//! under the link that led to them.

use crate::model::PageResult;
use crate::output::traits::OutputWriter;
use crate::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

pub struct JsonWriter;

impl OutputWriter for JsonWriter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, pages: &[Arc<PageResult>], path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        let roots: Vec<&PageResult> = pages.iter().map(|p| p.as_ref()).collect();
        serde_json::to_writer_pretty(&mut writer, &roots)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
