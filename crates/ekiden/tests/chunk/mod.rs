use std::sync::{Arc, Mutex};

use ekiden::{
    chunk::{BaseMediaChunkOutput, ChunkWindow, ContainerMediaChunk, InitializationChunk},
    extractor::{ReadResult, SampleFlags, SeekMap},
    format::mime_types,
    sample_queue::SampleQueue,
    upstream::MemoryDataSource,
    BundledChunkExtractor, ChunkExtractorFactory, DataSource, DataSpec, EkidenError,
    EkidenResult, Extractor, ExtractorInput, ExtractorOutput, Format, Loader, SharedChunkExtractor,
    TrackType,
};

use crate::AssertWrapper;

/// Reads records made of an 8 byte big-endian timestamp and one sample byte.
struct RecordExtractor {
    language: &'static str,
}

impl Extractor for RecordExtractor {
    fn sniff(&mut self, _input: &mut dyn ExtractorInput) -> EkidenResult<bool> {
        Ok(true)
    }

    fn init(&mut self, output: &mut dyn ExtractorOutput) {
        output.track(1, TrackType::Audio).format(
            Format::builder()
                .sample_mime_type("audio/raw")
                .language(self.language)
                .build(),
        );
        output.end_tracks();
        output.seek_map(SeekMap::Unseekable { duration_us: None });
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> EkidenResult<ReadResult> {
        let mut time = [0u8; 8];
        if !input.read_fully(&mut time, true)? {
            return Ok(ReadResult::EndOfInput);
        }

        let track = output.track(1, TrackType::Audio);
        let size = track.sample_data(input, 1, false)?;
        track.sample_metadata(
            i64::from_be_bytes(time),
            SampleFlags::KEY_FRAME,
            size,
            0,
            None,
        );
        Ok(ReadResult::Continue)
    }

    fn seek(&mut self, _position: u64, _time_us: i64) {}
}

fn records(times_us: &[i64]) -> Vec<u8> {
    let mut data = Vec::new();
    for time_us in times_us {
        data.extend_from_slice(&time_us.to_be_bytes());
        data.push(b'x');
    }
    data
}

fn manifest_format() -> Format {
    Format::builder()
        .id("audio-en")
        .container_mime_type(mime_types::AUDIO_MP4)
        .language("en")
        .build()
}

fn shared_extractor() -> SharedChunkExtractor {
    Arc::new(Mutex::new(BundledChunkExtractor::new(
        RecordExtractor { language: "fr" },
        TrackType::Audio,
        manifest_format(),
    )))
}

fn audio_output() -> (Arc<BaseMediaChunkOutput>, Arc<Mutex<SampleQueue>>) {
    let queue = Arc::new(Mutex::new(SampleQueue::new()));
    let output = BaseMediaChunkOutput::new(vec![TrackType::Audio], vec![queue.clone()]);
    (Arc::new(output), queue)
}

fn media_chunk(
    data: Vec<u8>,
    index: u64,
    start_time_us: i64,
    end_time_us: i64,
    chunk_extractor: &SharedChunkExtractor,
) -> ContainerMediaChunk {
    ContainerMediaChunk::new(
        Box::new(MemoryDataSource::new(data)),
        DataSpec::default(),
        manifest_format(),
        ChunkWindow {
            start_time_us,
            end_time_us: Some(end_time_us),
            clipped_start_time_us: Some(start_time_us),
            clipped_end_time_us: Some(end_time_us),
        },
        index,
        0,
        chunk_extractor.clone(),
    )
}

fn queued_times(queue: &Mutex<SampleQueue>) -> Vec<i64> {
    queue
        .lock()
        .unwrap()
        .samples()
        .map(|sample| sample.time_us)
        .collect()
}

#[tokio::test]
async fn test_media_chunks_share_extractor() -> anyhow::Result<()> {
    let loader = Loader::default();
    let chunk_extractor = shared_extractor();
    let (output, queue) = audio_output();

    let mut first = media_chunk(records(&[4_999, 5_000, 4_000]), 0, 0, 5_000, &chunk_extractor);
    first.init(output.clone());
    let (first, result) = loader.start_loading(first).join().await?;
    result.assert_success();
    assert!(first.is_load_completed());
    assert_eq!(first.first_sample_index(0), Some(0));

    // Everything from the first sample at or past the end is dropped.
    assert_eq!(queued_times(&queue), vec![4_999]);

    let mut second = media_chunk(records(&[6_000, 7_000]), 1, 5_000, 10_000, &chunk_extractor);
    second.init(output.clone());
    let (second, result) = loader.start_loading(second).join().await?;
    result.assert_success();
    assert_eq!(second.first_sample_index(0), Some(1));
    assert_eq!(second.next_chunk_index(), 2);

    assert_eq!(queued_times(&queue), vec![4_999, 6_000, 7_000]);
    Ok(())
}

#[tokio::test]
async fn test_manifest_format_wins() -> anyhow::Result<()> {
    let chunk_extractor = shared_extractor();
    let (output, queue) = audio_output();

    let mut chunk = media_chunk(records(&[0]), 0, 0, 1_000, &chunk_extractor);
    chunk.init(output);
    let (_, result) = Loader::default().start_loading(chunk).join().await?;
    result.assert_success();

    let queue = queue.lock().unwrap();
    let format = queue.upstream_format().assert_success();
    assert_eq!(format.language.as_deref(), Some("en"));
    assert_eq!(format.id.as_deref(), Some("audio-en"));
    assert_eq!(format.sample_mime_type.as_deref(), Some("audio/raw"));

    let sample_formats = chunk_extractor.lock().unwrap().sample_formats().map(<[Format]>::to_vec);
    assert_eq!(sample_formats.map(|formats| formats.len()), Some(1));
    Ok(())
}

/// Fails once after `fail_after` bytes and records where it is opened.
struct FlakySource {
    inner: MemoryDataSource,
    fail_after: Option<usize>,
    read: usize,
    opened_at: Arc<Mutex<Vec<u64>>>,
}

impl DataSource for FlakySource {
    fn open(&mut self, spec: &DataSpec) -> EkidenResult<Option<u64>> {
        self.opened_at.lock().unwrap().push(spec.position);
        self.inner.open(spec)
    }

    fn read(&mut self, buf: &mut [u8]) -> EkidenResult<usize> {
        let mut limit = buf.len();
        if let Some(fail_after) = self.fail_after {
            if self.read >= fail_after {
                self.fail_after = None;
                return Err(EkidenError::IOError(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )));
            }
            limit = limit.min(fail_after - self.read);
        }

        let read = self.inner.read(&mut buf[..limit])?;
        self.read += read;
        Ok(read)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[tokio::test]
async fn test_initialization_chunk_resumes() -> anyhow::Result<()> {
    let opened_at = Arc::new(Mutex::new(Vec::new()));
    let source = FlakySource {
        inner: MemoryDataSource::new(records(&[0, 10, 20, 30])),
        fail_after: Some(18),
        read: 0,
        opened_at: opened_at.clone(),
    };

    let chunk_extractor = shared_extractor();
    let (output, queue) = audio_output();
    let mut chunk = InitializationChunk::new(
        Box::new(source),
        DataSpec::default(),
        manifest_format(),
        chunk_extractor.clone(),
    );
    chunk.init(Some(output));

    let loader = Loader::default();
    let (chunk, result) = loader.start_loading(chunk).join().await?;
    assert!(result.is_err_and(|e| e.is_retryable()));
    assert_eq!(chunk.next_load_position(), 18);
    assert_eq!(queued_times(&queue), vec![0, 10]);

    let (chunk, result) = loader.start_loading(chunk).join().await?;
    result.assert_success();
    assert_eq!(chunk.next_load_position(), 36);
    assert_eq!(opened_at.lock().unwrap().as_slice(), &[0, 18]);
    assert_eq!(queued_times(&queue), vec![0, 10, 20, 30]);
    assert!(chunk.chunk_index().is_none());
    Ok(())
}

#[tokio::test]
async fn test_consumed_range_is_not_reopened() -> anyhow::Result<()> {
    let opened_at = Arc::new(Mutex::new(Vec::new()));
    // Every byte of the range is delivered before the connection drops.
    let source = FlakySource {
        inner: MemoryDataSource::new(records(&[0, 10, 20, 30])),
        fail_after: Some(36),
        read: 0,
        opened_at: opened_at.clone(),
    };

    let (output, queue) = audio_output();
    let mut chunk = InitializationChunk::new(
        Box::new(source),
        DataSpec::new(0, Some(36)),
        manifest_format(),
        shared_extractor(),
    );
    chunk.init(Some(output));

    let loader = Loader::default();
    let (chunk, result) = loader.start_loading(chunk).join().await?;
    assert!(result.is_err_and(|e| e.is_retryable()));
    assert_eq!(chunk.next_load_position(), 36);

    let (chunk, result) = loader.start_loading(chunk).join().await?;
    result.assert_success();
    assert_eq!(chunk.next_load_position(), 36);
    assert_eq!(opened_at.lock().unwrap().as_slice(), &[0]);
    assert_eq!(queued_times(&queue), vec![0, 10, 20, 30]);
    Ok(())
}

#[tokio::test]
async fn test_canceled_chunk_is_not_completed() -> anyhow::Result<()> {
    let chunk_extractor = shared_extractor();
    let (output, queue) = audio_output();
    let mut chunk = media_chunk(records(&[0, 1, 2]), 0, 0, 1_000, &chunk_extractor);
    chunk.init(output);

    let task = Loader::default().start_loading(chunk);
    task.cancel();
    let (chunk, result) = task.join().await?;
    assert!(matches!(result, Err(EkidenError::Canceled)));
    assert!(!chunk.is_load_completed());
    assert!(queue.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_factory_by_container() {
    let factory = ChunkExtractorFactory::new();
    let ogg = Format::builder()
        .container_mime_type(mime_types::AUDIO_OGG)
        .build();
    assert!(factory.create(TrackType::Audio, &ogg).assert_success().is_some());

    let vtt = Format::builder()
        .container_mime_type(mime_types::TEXT_VTT)
        .build();
    assert!(factory.create(TrackType::Text, &vtt).assert_success().is_none());

    let unknown = Format::builder()
        .container_mime_type("video/x-unknown")
        .build();
    assert!(matches!(
        factory.create(TrackType::Video, &unknown),
        Err(EkidenError::UnrecognizedContainer(_))
    ));
}
