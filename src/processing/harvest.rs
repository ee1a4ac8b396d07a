use std::fs;
use std::path::Path;
use std::time::Duration;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use thiserror::Error;

use crate::domain::record::ArchivalRecord;
use crate::models::config::HarvestConfig;
use crate::sources::{RecordSource, SourceError};

const ROOT_ELEMENT: &str = "adlibXML";
const RECORD_LIST_ELEMENT: &str = "recordList";

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed to serialize records: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("failed to write output file: {0}")]
    Io(#[from] std::io::Error),
    #[error("page size must be at least 1")]
    InvalidLimit,
}

/// Why pagination ended.
#[derive(Debug)]
pub enum StopReason {
    /// The source returned an empty page.
    Exhausted,
    Transport(SourceError),
    Parse(SourceError),
}

/// Records collected from a paginated source, in response order.
#[derive(Debug)]
pub struct Harvest {
    pub records: Vec<ArchivalRecord>,
    pub pages: usize,
    pub stop: StopReason,
}

/// Pages through `source` until an empty page or the first error.
///
/// The offset starts at `start_from` and grows by `limit` after every
/// non-empty page. Records gathered before an error are kept. A zero
/// `limit` is rejected before any request.
pub async fn harvest_records<S>(
    source: &S,
    start_from: usize,
    limit: usize,
    page_delay: Duration,
) -> Result<Harvest, HarvestError>
where
    S: RecordSource + ?Sized,
{
    if limit == 0 {
        return Err(HarvestError::InvalidLimit);
    }

    log::info!("Harvesting records, {limit} per page");

    let mut records = Vec::new();
    let mut pages = 0;
    let mut offset = start_from;

    let stop = loop {
        log::info!("Fetching records starting from {offset}");
        let page = match source.fetch_page(offset, limit).await {
            Ok(page) => page,
            Err(e) if e.is_parse() => {
                log::error!("Failed to parse page at {offset}: {e}");
                break StopReason::Parse(e);
            }
            Err(e) => {
                log::error!("Failed to fetch page at {offset}: {e}");
                break StopReason::Transport(e);
            }
        };

        if page.is_empty() {
            log::info!("No more records found");
            break StopReason::Exhausted;
        }

        pages += 1;
        let added = page.len();
        records.extend(page);
        log::info!("  ... {added} records added, {} in total", records.len());

        offset += limit;

        if !page_delay.is_zero() {
            tokio::time::sleep(page_delay).await;
        }
    };

    Ok(Harvest {
        records,
        pages,
        stop,
    })
}

/// Writes all records under `<adlibXML><recordList>` as one UTF-8 document
/// indented by two spaces, replacing `path`.
pub fn write_record_document(path: &Path, records: &[ArchivalRecord]) -> Result<(), HarvestError> {
    let document = render_record_document(records)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, document)?;
    Ok(())
}

/// Renders the combined document in memory.
pub fn render_record_document(records: &[ArchivalRecord]) -> Result<Vec<u8>, HarvestError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
    if records.is_empty() {
        writer.write_event(Event::Empty(BytesStart::new(RECORD_LIST_ELEMENT)))?;
    } else {
        writer.write_event(Event::Start(BytesStart::new(RECORD_LIST_ELEMENT)))?;
        for record in records {
            for event in record.events() {
                writer.write_event(event.clone())?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new(RECORD_LIST_ELEMENT)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let mut document = writer.into_inner();
    document.push(b'\n');
    Ok(document)
}

/// Harvests every page of `source` and persists whatever was collected.
pub async fn harvest_to_file<S>(source: &S, config: &HarvestConfig) -> Result<Harvest, HarvestError>
where
    S: RecordSource + ?Sized,
{
    let harvest = harvest_records(
        source,
        config.start_from,
        config.limit,
        Duration::from_millis(config.page_delay_ms),
    )
    .await?;

    log::info!(
        "Harvest finished after {} pages: {} records collected",
        harvest.pages,
        harvest.records.len()
    );
    log::info!("Saving combined document as {}", config.output_file.display());

    write_record_document(&config.output_file, &harvest.records)?;

    log::info!("Wrote {}", config.output_file.display());
    Ok(harvest)
}
