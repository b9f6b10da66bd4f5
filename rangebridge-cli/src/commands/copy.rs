//! Copy command - stream a whole file through the bridge in chunks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use rangebridge::loopback::LoopbackProducer;
use rangebridge::ElementRef;

use super::common::{format_size, print_summary, TransportArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the copy command.
pub struct CopyArgs {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub transport: Option<TransportArg>,
    pub chunk_size: Option<usize>,
}

/// Run the copy command.
pub fn run(args: CopyArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("copy");

    let config = runner.transfer_config(args.transport.map(Into::into), args.chunk_size);
    let chunk_size = config.chunk_size();
    let producer = LoopbackProducer::new();
    let coordinator = runner.coordinator(config, &producer);
    let cancel = runner.cancel_on_ctrlc()?;

    println!("Source:      {}", args.source.display());
    println!("Destination: {}", args.destination.display());
    println!("Transport:   {}", coordinator.transport());
    println!("Chunk size:  {}", format_size(chunk_size as u64));
    println!();

    let element = ElementRef::new("cli");
    let result = runner.block_on(async {
        let index = producer.add_path(&element, &args.source).await?;
        let mut stream = coordinator.open_read(&element, index).await?;

        let progress = ProgressBar::new(stream.len());
        progress.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} \
                 ({bytes_per_sec}, {eta})",
            )
            .map_err(|e| CliError::Runtime(e.to_string()))?
            .progress_chars("=> "),
        );

        let mut writer = BufWriter::new(File::create(&args.destination)?);
        let mut chunk = vec![0u8; chunk_size];
        let mut copied = 0u64;
        loop {
            let n = match stream.read(&mut chunk, &cancel).await {
                Ok(n) => n,
                Err(e) => {
                    progress.abandon();
                    stream.close().await?;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n])?;
            copied += n as u64;
            progress.set_position(copied);
        }
        writer.flush()?;
        progress.finish_and_clear();
        stream.close().await?;
        Ok::<_, CliError>(copied)
    });

    if let Ok(copied) = &result {
        println!("{} Copied {}", style("✓").green(), format_size(*copied));
    }
    print_summary(&coordinator.metrics());
    coordinator.shutdown();
    result.map(|_| ())
}
