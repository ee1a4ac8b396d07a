use provenance_tools::models::config::HarvestConfig;
use provenance_tools::processing::harvest::{StopReason, harvest_to_file};
use provenance_tools::sources::adlib::AdlibSource;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

const ENDPOINT: &str = "/api.wo2/wwwopac.ashx";

fn page(first_priref: usize, count: usize) -> String {
    let records: String = (first_priref..first_priref + count)
        .map(|priref| format!("<record priref=\"{priref}\"><object_number>NK{priref}</object_number></record>"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><adlibXML><recordList>{records}</recordList><diagnostic><hits>4</hits></diagnostic></adlibXML>"
    )
}

fn empty_page() -> String {
    "<adlibXML><diagnostic><hits>4</hits></diagnostic></adlibXML>".to_string()
}

async fn mount_page(server: &MockServer, start_from: usize, body: String, status: u16) {
    Mock::given(method("GET"))
        .and(path(ENDPOINT))
        .and(query_param("database", "HerkomstNK"))
        .and(query_param("search", "all"))
        .and(query_param("startfrom", start_from.to_string()))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn config(server: &MockServer, workspace: &common::TestWorkspace) -> HarvestConfig {
    HarvestConfig {
        base_url: format!("{}{ENDPOINT}", server.uri()),
        database: "HerkomstNK".to_string(),
        limit: 2,
        start_from: 1,
        output_file: workspace.path().join("HerkomstNK.xml"),
        page_delay_ms: 0,
    }
}

#[tokio::test]
async fn test_harvest_collects_every_page_in_order() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page(1, 2), 200).await;
    mount_page(&server, 3, page(3, 2), 200).await;
    mount_page(&server, 5, empty_page(), 200).await;
    let workspace = common::TestWorkspace::new();
    let config = config(&server, &workspace);
    let source = AdlibSource::new(&config.base_url, &config.database).expect("valid source");

    let harvest = harvest_to_file(&source, &config).await.expect("harvest written");

    assert!(matches!(harvest.stop, StopReason::Exhausted));
    assert_eq!(harvest.pages, 2);
    assert_eq!(harvest.records.len(), 4);

    let document = std::fs::read_to_string(&config.output_file).expect("output file");
    assert!(document.starts_with("<?xml"));
    let positions: Vec<usize> = (1..=4)
        .map(|priref| {
            document
                .find(&format!("<object_number>NK{priref}</object_number>"))
                .expect("record present")
        })
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(!document.contains("diagnostic"));
}

#[tokio::test]
async fn test_harvest_keeps_records_before_a_failed_page() {
    let server = MockServer::start().await;
    mount_page(&server, 1, page(1, 2), 200).await;
    mount_page(&server, 3, "unavailable".to_string(), 503).await;
    let workspace = common::TestWorkspace::new();
    let config = config(&server, &workspace);
    let source = AdlibSource::new(&config.base_url, &config.database).expect("valid source");

    let harvest = harvest_to_file(&source, &config).await.expect("harvest written");

    assert!(matches!(harvest.stop, StopReason::Transport(_)));
    assert_eq!(harvest.records.len(), 2);
    let document = std::fs::read_to_string(&config.output_file).expect("output file");
    assert!(document.contains("<object_number>NK2</object_number>"));
    assert!(!document.contains("NK3"));
}

#[tokio::test]
async fn test_harvest_stops_on_malformed_page() {
    let server = MockServer::start().await;
    mount_page(&server, 1, "<adlibXML><recordList><record>".to_string(), 200).await;
    let workspace = common::TestWorkspace::new();
    let config = config(&server, &workspace);
    let source = AdlibSource::new(&config.base_url, &config.database).expect("valid source");

    let harvest = harvest_to_file(&source, &config).await.expect("harvest written");

    assert!(matches!(harvest.stop, StopReason::Parse(_)));
    assert!(harvest.records.is_empty());
    assert!(config.output_file.exists());
}
