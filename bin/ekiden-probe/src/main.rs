use std::{
    num::NonZeroU32,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::bail;
use clap::Parser;
use ekiden::{
    chunk::{BaseMediaChunkOutput, InitializationChunk},
    extractor::{sniff_extractor, DefaultExtractorInput, SeekMap},
    sample_queue::SampleQueue,
    upstream::{FileDataSource, HttpDataSource},
    BundledChunkExtractor, ChunkExtractorFactory, DataSource, DataSpec, Format, Loader, TrackType,
};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Url,
};
use tokio::runtime::Handle;

const TRACK_TYPES: [TrackType; 5] = [
    TrackType::Audio,
    TrackType::Video,
    TrackType::Text,
    TrackType::Image,
    TrackType::Metadata,
];

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct ProbeArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Threads limit
    #[clap(long, default_value = "5")]
    threads: NonZeroU32,

    /// Container MIME type of the input
    ///
    /// Sniffed from the first bytes when omitted.
    #[clap(long)]
    mime: Option<String>,

    /// First byte to load
    #[clap(long, default_value = "0")]
    offset: u64,

    /// Number of bytes to load
    #[clap(long)]
    length: Option<u64>,

    /// HTTP Header used to download
    ///
    /// Custom header. eg. "User-Agent: xxxxx".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Samples printed per track
    #[clap(long, default_value = "10")]
    samples: usize,

    /// File path or http(s) URL
    input: String,
}

impl ProbeArgs {
    fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for header in &self.headers {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header: {header}");
            };
            headers.insert(
                HeaderName::from_str(key.trim())?,
                HeaderValue::from_str(value.trim())?,
            );
        }
        Ok(headers)
    }

    fn data_source(&self) -> anyhow::Result<Box<dyn DataSource>> {
        match Url::parse(&self.input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let client = Client::builder().default_headers(self.headers()?).build()?;
                Ok(Box::new(HttpDataSource::new(Handle::current(), client, url)))
            }
            _ => Ok(Box::new(FileDataSource::new(&self.input))),
        }
    }

    fn data_spec(&self) -> DataSpec {
        DataSpec::new(self.offset, self.length).with_key(self.input.clone())
    }
}

/// Finds the container of the input. The source is handed back closed.
async fn sniff_container(
    mut source: Box<dyn DataSource>,
    spec: DataSpec,
) -> anyhow::Result<(Box<dyn DataSource>, String)> {
    tokio::task::spawn_blocking(move || {
        let length = source.open(&spec)?;
        let mut input = DefaultExtractorInput::new(
            &mut source,
            spec.position,
            length.map(|length| length + spec.position),
        );
        let sniffed = sniff_extractor(&mut input);
        source.close();

        let mime_type = sniffed?.container_mime_type().to_string();
        Ok::<_, anyhow::Error>((source, mime_type))
    })
    .await?
}

fn describe(format: &Format) -> String {
    let mut parts = Vec::new();
    if let Some(mime_type) = &format.sample_mime_type {
        parts.push(mime_type.clone());
    }
    if let Some(channel_count) = format.channel_count {
        parts.push(format!("{channel_count}ch"));
    }
    if let Some(sample_rate) = format.sample_rate {
        parts.push(format!("{sample_rate}Hz"));
    }
    if let Some(language) = &format.language {
        parts.push(language.clone());
    }
    if !format.initialization_data.is_empty() {
        parts.push(format!(
            "{} initialization data",
            format.initialization_data.len()
        ));
    }
    parts.join(", ")
}

fn print_tracks(
    chunk_extractor: &BundledChunkExtractor,
    queues: &[Arc<Mutex<SampleQueue>>],
    max_samples: usize,
) {
    match chunk_extractor.sample_formats() {
        Some(formats) => {
            for (index, format) in formats.iter().enumerate() {
                println!("Track #{index} [{:?}]: {}", format.track_type(), describe(format));
            }
        }
        None => println!("Tracks did not end within the loaded range"),
    }

    match chunk_extractor.seek_map() {
        Some(SeekMap::ChunkIndex(index)) => {
            println!("Chunk index: {} chunks, {} us", index.len(), index.duration_us());
            for i in 0..index.len() {
                println!(
                    "  #{i}: {} us (+{} us) at byte {}, {} bytes",
                    index.times_us[i], index.durations_us[i], index.offsets[i], index.sizes[i]
                );
            }
        }
        Some(SeekMap::Unseekable { duration_us }) => {
            println!("Unseekable, duration: {duration_us:?} us")
        }
        None => println!("No seek map"),
    }

    for (track_type, queue) in TRACK_TYPES.iter().zip(queues) {
        let queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.write_index() == 0 {
            continue;
        }

        println!("{track_type:?}: {} samples", queue.write_index());
        for sample in queue.samples().take(max_samples) {
            println!(
                "  {:>12} us {:>8} bytes {:?}",
                sample.time_us,
                sample.data.len(),
                sample.flags
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ProbeArgs::parse();

    let default_level = if args.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .try_from_env()
                .unwrap_or_else(|_| default_level.to_string().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let source = args.data_source()?;
    let spec = args.data_spec();
    let (source, mime_type) = match &args.mime {
        Some(mime_type) => (source, mime_type.clone()),
        None => sniff_container(source, spec.clone()).await?,
    };
    tracing::info!("Container: {mime_type}");

    let format = Format::builder()
        .container_mime_type(mime_type.clone())
        .build();
    let primary_track_type = TrackType::from_mime_type(Some(&mime_type));
    let Some(chunk_extractor) = ChunkExtractorFactory::new()
        .parse_subtitles_during_extraction(true)
        .create(primary_track_type, &format)?
    else {
        bail!("No extractor for {mime_type}");
    };
    let chunk_extractor = Arc::new(Mutex::new(chunk_extractor));

    let queues: Vec<_> = TRACK_TYPES
        .iter()
        .map(|_| Arc::new(Mutex::new(SampleQueue::new())))
        .collect();
    let output = BaseMediaChunkOutput::new(TRACK_TYPES.to_vec(), queues.clone());

    let mut chunk = InitializationChunk::new(source, spec, format, chunk_extractor.clone());
    chunk.init(Some(Arc::new(output)));

    let loader = Loader::builder().concurrency(args.threads).build();
    let (chunk, result) = loader.start_loading(chunk).join().await?;
    result?;
    tracing::info!("Loaded {} bytes", chunk.next_load_position());

    let chunk_extractor = chunk_extractor
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    print_tracks(&chunk_extractor, &queues, args.samples);

    Ok(())
}
