use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use url::Url;

use crate::domain::record::ArchivalRecord;
use crate::sources::{RecordSource, SourceError, SourceResult, build_reqwest_client};

const PAGE_PARAMS: [&str; 4] = ["database", "limit", "search", "startfrom"];

/// Source backed by an Adlib `wwwopac.ashx` endpoint.
pub struct AdlibSource {
    base_url: Url,
    database: String,
    client: reqwest::Client,
}

impl AdlibSource {
    /// Creates a source querying `database` at `base_url`.
    pub fn new(base_url: &str, database: &str) -> SourceResult<Self> {
        Ok(Self {
            base_url: Url::parse(base_url).map_err(|e| SourceError::Build(e.to_string()))?,
            database: database.to_string(),
            client: build_reqwest_client(None)?,
        })
    }

    /// URL of one result page. Query parameters already present on the base
    /// URL are kept, paging parameters are replaced.
    pub fn page_url(&self, start_from: usize, limit: usize) -> Url {
        let mut page_url = self.base_url.clone();
        let pairs: Vec<(String, String)> = page_url
            .query_pairs()
            .filter(|(k, _)| !PAGE_PARAMS.contains(&k.as_ref()))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        page_url.set_query(None);
        page_url
            .query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(k, v)| (&**k, &**v)))
            .append_pair("database", &self.database)
            .append_pair("limit", &limit.to_string())
            .append_pair("search", "all")
            .append_pair("startfrom", &start_from.to_string());

        page_url
    }
}

#[async_trait]
impl RecordSource for AdlibSource {
    async fn fetch_page(&self, start_from: usize, limit: usize) -> SourceResult<Vec<ArchivalRecord>> {
        let url = self.page_url(start_from, limit);
        let res = self.client.get(url.clone()).send().await?;
        if !res.status().is_success() {
            return Err(SourceError::Status {
                status: res.status(),
                url: url.to_string(),
            });
        }
        let body = res.bytes().await?;
        parse_record_page(&body)
    }
}

/// Extracts every `<record>` whose parent is a `<recordList>`, at any depth,
/// in document order.
///
/// Whitespace-only text between elements is dropped; whitespace that is the
/// whole content of a leaf element is kept, as is all other content. A body without a root element or with unbalanced
/// tags is rejected.
pub fn parse_record_page(body: &[u8]) -> SourceResult<Vec<ArchivalRecord>> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut saw_element = false;
    let mut records = Vec::new();
    // Depth of the enclosing `recordList` and the events collected so far.
    let mut current: Option<(usize, Vec<Event<'static>>)> = None;
    let mut after_start = false;
    let mut pending_blank: Option<Event<'static>> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| {
                SourceError::Parse(format!("{e} at position {}", reader.error_position()))
            })?
            .into_owned();

        let is_blank =
            matches!(&event, Event::Text(text) if text.iter().all(u8::is_ascii_whitespace));
        if is_blank {
            // Kept only if the element closes right after it.
            if after_start {
                pending_blank = Some(event);
            }
            after_start = false;
            buf.clear();
            continue;
        }
        let blank = pending_blank.take();
        after_start = matches!(event, Event::Start(_));

        match &event {
            Event::Eof => break,
            Event::Start(start) => {
                saw_element = true;
                let name = start.name().as_ref().to_vec();
                if current.is_none() && is_record(&name, &open) {
                    current = Some((open.len(), Vec::new()));
                }
                open.push(name);
            }
            Event::Empty(start) => {
                saw_element = true;
                if current.is_none() && is_record(start.name().as_ref(), &open) {
                    records.push(ArchivalRecord::new(vec![event]));
                    buf.clear();
                    continue;
                }
            }
            Event::End(_) => {
                if open.pop().is_none() {
                    return Err(SourceError::Parse("unexpected closing tag".to_string()));
                }
                if let (Some(blank), Some((_, events))) = (blank, current.as_mut()) {
                    events.push(blank);
                }
            }
            _ => {}
        }

        let finished = match current.as_mut() {
            Some((depth, events)) => {
                events.push(event);
                open.len() == *depth
            }
            None => false,
        };
        if finished && let Some((_, events)) = current.take() {
            records.push(ArchivalRecord::new(events));
        }

        buf.clear();
    }

    if !open.is_empty() {
        return Err(SourceError::Parse(format!(
            "unclosed element <{}>",
            String::from_utf8_lossy(open.last().map(Vec::as_slice).unwrap_or_default())
        )));
    }
    if !saw_element {
        return Err(SourceError::Parse("no root element found".to_string()));
    }

    Ok(records)
}

fn is_record(name: &[u8], open: &[Vec<u8>]) -> bool {
    name == b"record" && open.last().is_some_and(|parent| parent == b"recordList")
}
