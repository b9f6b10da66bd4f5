//! Read command - read one byte range from a local file through the bridge.

use std::path::PathBuf;

use console::style;
use rangebridge::loopback::LoopbackProducer;
use rangebridge::{ElementRef, ReadRequest};

use super::common::{format_size, hex_dump, print_summary, TransportArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Largest destination buffer the read command will allocate.
const MAX_DESTINATION_LEN: usize = 256 * 1024 * 1024;

/// Arguments for the read command.
pub struct ReadArgs {
    pub path: PathBuf,
    pub position: u64,
    pub count: u32,
    pub offset: u64,
    pub transport: Option<TransportArg>,
    pub corrupt: usize,
    pub hex: bool,
}

/// Run the read command.
pub fn run(args: ReadArgs) -> Result<(), CliError> {
    let destination_len = destination_len(args.offset, args.count)?;
    let runner = CliRunner::new()?;
    runner.log_startup("read");

    let config = runner.transfer_config(args.transport.map(Into::into), None);
    let producer = LoopbackProducer::new();
    producer.corrupt_next_shared_reads(args.corrupt);
    let coordinator = runner.coordinator(config, &producer);
    let cancel = runner.cancel_on_ctrlc()?;

    println!("Path:      {}", args.path.display());
    println!("Transport: {}", coordinator.transport());
    println!(
        "Range:     {} bytes at {} (buffer offset {})",
        args.count, args.position, args.offset
    );
    println!();

    let element = ElementRef::new("cli");
    let result = runner.block_on(async {
        let index = producer.add_path(&element, &args.path).await?;
        let stream = coordinator.open_read(&element, index).await?;
        let file = stream.file();
        let size = stream.len();

        let mut destination = vec![0u8; destination_len];
        let request = ReadRequest::new(file, args.position, args.count, args.offset);
        let read = coordinator.read_range(request, &mut destination, &cancel).await;
        stream.close().await?;

        let bytes_read = read?;
        let start = destination_len - args.count as usize;
        destination.truncate(start + bytes_read as usize);
        destination.drain(..start);
        Ok::<_, CliError>((size, destination))
    });

    let outcome = result.map(|(size, bytes)| {
        println!(
            "{} {} of {} read",
            style("✓").green(),
            format_size(bytes.len() as u64),
            format_size(size)
        );
        println!();
        if args.hex {
            print!("{}", hex_dump(&bytes, args.position));
        } else {
            println!("{}", String::from_utf8_lossy(&bytes));
        }
    });

    print_summary(&coordinator.metrics());
    coordinator.shutdown();
    outcome
}


/// Size of the buffer holding `count` bytes after `offset` leading bytes.
fn destination_len(offset: u64, count: u32) -> Result<usize, CliError> {
    usize::try_from(offset)
        .ok()
        .and_then(|offset| offset.checked_add(count as usize))
        .filter(|len| *len <= MAX_DESTINATION_LEN)
        .ok_or_else(|| {
            CliError::Config(format!(
                "--offset {} plus --count {} exceeds the {} destination limit",
                offset,
                count,
                format_size(MAX_DESTINATION_LEN as u64)
            ))
        })
}
