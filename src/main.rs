use clap::Parser;
use std::io::{BufWriter, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use htsfetch::{
    BamFile, Config, Error, ReadOptions, Region, TwoBitFile,
    config::Command,
    formats::IndexManifest,
    storage::{SourceOptions, open_source},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = config.source_options();
    match config.command {
        Command::Reads {
            data,
            index,
            manifest,
            region,
            light,
            include_name,
        } => {
            let read_options = ReadOptions {
                light,
                include_name,
            };
            reads(&options, &data, index.as_deref(), manifest, &region, read_options).await
        }
        Command::Sequence { data, region } => sequence(&options, &data, &region).await,
    }
}

async fn reads(
    options: &SourceOptions,
    data: &str,
    index: Option<&str>,
    manifest: Option<std::path::PathBuf>,
    region: &str,
    read_options: ReadOptions,
) -> anyhow::Result<()> {
    let region: Region = region.parse()?;

    let data = open_source(data, options).await?;
    let index = match index {
        Some(location) => Some(open_source(location, options).await?),
        None => None,
    };
    let manifest = match manifest {
        Some(path) => {
            let text = tokio::fs::read_to_string(&path).await?;
            Some(serde_json::from_str::<IndexManifest>(&text)?)
        }
        None => None,
    };

    let bam = BamFile::open(data, index, manifest).await?;
    let records = bam.fetch_region(&region, read_options).await?;
    tracing::info!("{} records in {}", records.len(), region.reference_name);

    let mut out = BufWriter::new(std::io::stdout().lock());
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

async fn sequence(options: &SourceOptions, data: &str, region: &str) -> anyhow::Result<()> {
    let region: Region = region.parse()?;
    let file = TwoBitFile::open(open_source(data, options).await?).await?;

    let name = &region.reference_name;
    let Some(length) = file.length(name).await? else {
        return Err(Error::NotFound(format!("no sequence named {} in {}", name, data)).into());
    };
    let min = region.start.unwrap_or(1) as i64;
    let max = region.end.unwrap_or(u64::from(length)) as i64;

    let bases = file.fetch(name, min, max).await?.unwrap_or_default();
    let mut out = std::io::stdout().lock();
    writeln!(out, ">{}:{}-{}", name, min, max)?;
    for line in bases.as_bytes().chunks(60) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
