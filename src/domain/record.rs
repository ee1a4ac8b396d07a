use quick_xml::Writer;
use quick_xml::events::Event;

/// One `<record>` element of an archival API response, subtree included.
///
/// The fragment is opaque: it is neither validated nor deduplicated, only
/// carried from the page it was found on into the combined document.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchivalRecord {
    events: Vec<Event<'static>>,
}

impl ArchivalRecord {
    pub fn new(events: Vec<Event<'static>>) -> Self {
        Self { events }
    }

    /// Parsed XML events from the opening `<record>` to its closing tag.
    pub fn events(&self) -> &[Event<'static>] {
        &self.events
    }

    /// Serializes the fragment without any indentation.
    pub fn to_xml(&self) -> quick_xml::Result<String> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.events {
            writer.write_event(event.clone())?;
        }
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}
