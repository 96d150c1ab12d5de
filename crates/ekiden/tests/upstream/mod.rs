use std::sync::{Arc, Mutex};

use ekiden::{
    chunk::{BaseMediaChunkOutput, InitializationChunk},
    format::mime_types,
    sample_queue::SampleQueue,
    upstream::{FileDataSource, HttpDataSource},
    ChunkExtractorFactory, DataSource, DataSpec, EkidenError, EkidenResult, Format, Loader,
    TrackType,
};
use reqwest::{Client, StatusCode, Url};
use tokio::runtime::Handle;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::AssertWrapper;

fn read_to_end(source: &mut dyn DataSource) -> EkidenResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4];
    loop {
        let read = source.read(&mut buf)?;
        if read == 0 {
            return Ok(data);
        }
        data.extend_from_slice(&buf[..read]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_byte_range() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chunk.bin"))
        .and(header("Range", "bytes=4-9"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"456789".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/chunk.bin", mock_server.uri()))?;
    let handle = Handle::current();
    let (length, data) = tokio::task::spawn_blocking(move || {
        let mut source = HttpDataSource::new(handle, Client::new(), url);
        let length = source.open(&DataSpec::new(4, Some(6)))?;
        let data = read_to_end(&mut source)?;
        source.close();
        Ok::<_, EkidenError>((length, data))
    })
    .await??;

    assert_eq!(length, Some(6));
    assert_eq!(data, b"456789");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_range_ignored_by_server() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/full.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .expect(2)
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/full.bin", mock_server.uri()))?;
    let handle = Handle::current();
    let results = tokio::task::spawn_blocking(move || {
        let mut source = HttpDataSource::new(handle, Client::new(), url);
        let mut results = Vec::new();
        for spec in [
            DataSpec::new(4, None),
            DataSpec::new(2, Some(3)),
            DataSpec::new(10, Some(0)),
        ] {
            let length = source.open(&spec)?;
            results.push((length, read_to_end(&mut source)?));
            source.close();
        }
        Ok::<_, EkidenError>(results)
    })
    .await??;

    assert_eq!(
        results,
        vec![
            (Some(6), b"456789".to_vec()),
            (Some(3), b"234".to_vec()),
            (Some(0), Vec::new()),
        ]
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_error_status() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/missing.bin", mock_server.uri()))?;
    let handle = Handle::current();
    let result = tokio::task::spawn_blocking(move || {
        HttpDataSource::new(handle, Client::new(), url).open(&DataSpec::default())
    })
    .await?;

    match result {
        Err(error @ EkidenError::HttpError(status)) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert!(error.is_retryable());
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_initialization_chunk_over_http() -> anyhow::Result<()> {
    let stream = crate::extractor::opus_stream();
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/audio.ogg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(stream))
        .mount(&mock_server)
        .await;

    let format = Format::builder()
        .id("audio")
        .container_mime_type(mime_types::AUDIO_OGG)
        .language("ja")
        .build();
    let chunk_extractor = ChunkExtractorFactory::new()
        .create(TrackType::Audio, &format)?
        .assert_success();
    let chunk_extractor = Arc::new(Mutex::new(chunk_extractor));

    let queue = Arc::new(Mutex::new(SampleQueue::new()));
    let output = BaseMediaChunkOutput::new(vec![TrackType::Audio], vec![queue.clone()]);

    let url = Url::parse(&format!("{}/audio.ogg", mock_server.uri()))?;
    let source = HttpDataSource::new(Handle::current(), Client::new(), url);
    let mut chunk = InitializationChunk::new(
        Box::new(source),
        DataSpec::default(),
        format,
        chunk_extractor.clone(),
    );
    chunk.init(Some(Arc::new(output)));

    let (_, result) = Loader::default().start_loading(chunk).join().await?;
    result.assert_success();

    let sample_formats = chunk_extractor
        .lock()
        .unwrap()
        .sample_formats()
        .map(<[Format]>::to_vec)
        .assert_success();
    assert_eq!(sample_formats.len(), 1);
    assert_eq!(sample_formats[0].language.as_deref(), Some("ja"));
    assert_eq!(
        sample_formats[0].sample_mime_type.as_deref(),
        Some(mime_types::AUDIO_OPUS)
    );

    let times: Vec<_> = queue
        .lock()
        .unwrap()
        .samples()
        .map(|sample| sample.time_us)
        .collect();
    assert_eq!(times, vec![0, 20_000, 40_000]);
    Ok(())
}

#[test]
fn test_file_range() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("ekiden-file-range-{}", std::process::id()));
    std::fs::write(&path, b"abcdefgh")?;

    let mut source = FileDataSource::new(&path);
    let length = source.open(&DataSpec::new(2, Some(3)))?;
    assert_eq!(length, Some(3));
    assert_eq!(read_to_end(&mut source)?, b"cde");

    // Ranges past the end are cut short.
    let length = source.open(&DataSpec::new(6, Some(10)))?;
    assert_eq!(length, Some(2));
    assert_eq!(read_to_end(&mut source)?, b"gh");
    source.close();

    std::fs::remove_file(&path)?;
    Ok(())
}
