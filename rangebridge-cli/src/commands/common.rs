//! Common types and utilities shared across CLI commands.

use clap::ValueEnum;
use rangebridge::telemetry::TransferSnapshot;
use rangebridge::TransportMode;

/// Transport selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum TransportArg {
    /// Base64 round trip through the producer
    Marshalled,
    /// Shared buffer with out-of-band completion and verification
    Unmarshalled,
}

impl From<TransportArg> for TransportMode {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Marshalled => TransportMode::Marshalled,
            TransportArg::Unmarshalled => TransportMode::Unmarshalled,
        }
    }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Print the end-of-command transfer summary.
pub fn print_summary(snapshot: &TransferSnapshot) {
    println!();
    println!("Transfer Summary");
    println!("────────────────");
    println!("  {}", snapshot);
}

/// Render bytes as a classic 16-column hex dump.
pub fn hex_dump(bytes: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        out.push_str(&format!(
            "{:08x}  {:<47}  |{}|\n",
            base + (row * 16) as u64,
            hex.join(" "),
            ascii
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_hex_dump() {
        let dump = hex_dump(b"AB\x00", 16);
        assert_eq!(dump, format!("00000010  {:<47}  |AB.|\n", "41 42 00"));
    }

    #[test]
    fn test_transport_arg_conversion() {
        assert_eq!(
            TransportMode::from(TransportArg::Unmarshalled),
            TransportMode::Unmarshalled
        );
    }
}
