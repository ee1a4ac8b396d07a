use std::fs;

use provenance_tools::models::config::FetchConfig;
use provenance_tools::processing::fetch::{FetchStats, download_images};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

#[tokio::test]
async fn test_download_skips_bad_rows_and_saves_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/NK3.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpeg bytes".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/iiif/NK4/full"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"png bytes".to_vec(), "image/png"))
        .mount(&server)
        .await;

    let workspace = common::TestWorkspace::new();
    let csv_file = workspace.path().join("images.csv");
    let uri = server.uri();
    fs::write(
        &csv_file,
        format!(
            "object_number,reproduction_url\n\
             NK1,\n\
             NK2,not a url\n\
             NK3,{uri}/images/NK3.jpg\n\
             NK4,{uri}/iiif/NK4/full\n\
             NK5,{uri}/images/missing.jpg\n"
        ),
    )
    .expect("csv written");
    let config = FetchConfig {
        csv_file,
        download_folder: workspace.path().join("downloads/nested"),
        wait_time_secs: 0,
        timeout_secs: 5,
        ..Default::default()
    };

    let stats = download_images(&config).await.expect("download run");

    assert_eq!(
        stats,
        FetchStats {
            processed: 5,
            skipped: 2,
            attempted: 3,
            downloaded: 2,
            failed: 1,
        }
    );
    assert_eq!(stats.processed, stats.skipped + stats.attempted);

    let mut saved: Vec<String> = fs::read_dir(&config.download_folder)
        .expect("folder created")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    saved.sort();
    assert_eq!(saved, vec!["NK3.jpg", "image_4.png"]);
    assert_eq!(
        fs::read(config.download_folder.join("NK3.jpg")).expect("saved body"),
        b"jpeg bytes"
    );
}

#[tokio::test]
async fn test_download_requires_url_column() {
    let workspace = common::TestWorkspace::new();
    let csv_file = workspace.path().join("images.csv");
    fs::write(&csv_file, "object_number,url\nNK1,http://example.invalid/a.jpg\n").expect("csv");
    let config = FetchConfig {
        csv_file,
        download_folder: workspace.path().join("downloads"),
        wait_time_secs: 0,
        ..Default::default()
    };

    assert!(download_images(&config).await.is_err());
}

#[tokio::test]
async fn test_download_waits_after_every_attempt_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/images/NK1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(b"jpeg bytes".to_vec(), "image/jpeg"))
        .mount(&server)
        .await;

    let workspace = common::TestWorkspace::new();
    let csv_file = workspace.path().join("images.csv");
    let uri = server.uri();
    fs::write(
        &csv_file,
        format!(
            "object_number,reproduction_url\n\
             NK1,{uri}/images/NK1.jpg\n\
             NK2,\n\
             NK3,{uri}/images/missing.jpg\n\
             NK4,ftp-share/NK4.jpg\n"
        ),
    )
    .expect("csv written");
    let config = FetchConfig {
        csv_file,
        download_folder: workspace.path().join("downloads"),
        wait_time_secs: 1,
        timeout_secs: 5,
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let stats = download_images(&config).await.expect("download run");
    let elapsed = started.elapsed();

    assert_eq!((stats.attempted, stats.skipped), (2, 2));
    // One wait per attempted row, successful or failed; skipped rows add none.
    assert!(elapsed >= std::time::Duration::from_secs(2), "elapsed {elapsed:?}");
    assert!(elapsed < std::time::Duration::from_secs(3), "elapsed {elapsed:?}");
}
