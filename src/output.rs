use std::io::{self, Write};

use serde::Serialize;

use crate::domain::{ExpressionRecord, GeneLocator, GexQueryResult};
use crate::format::ShardHeader;

#[derive(Debug, Clone, Serialize)]
pub struct InspectResult {
    pub file: String,
    pub header: ShardHeader,
    pub records: Vec<GeneLocator>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_query(result: &GexQueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_record(record: &ExpressionRecord) -> io::Result<()> {
        Self::print_json(record)
    }

    pub fn print_inspect(result: &InspectResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
