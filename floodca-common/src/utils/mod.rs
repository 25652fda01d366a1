// private sub-module defined in other files
mod byte_order_reader;
mod byte_order_writer;

// exports identifiers from private sub-modules in the current module namespace
pub use self::byte_order_reader::ByteOrderReader;
pub use self::byte_order_reader::Endianness;
pub use self::byte_order_writer::ByteOrderWriter;

use std::time::Instant;

/// Returns a formatted string of elapsed time, e.g.
/// `1min 34s 852ms`
pub fn get_formatted_elapsed_time(instant: Instant) -> String {
    let dur = instant.elapsed();
    let minutes = dur.as_secs() / 60;
    let sub_sec = dur.as_secs() % 60;
    let sub_milli = dur.subsec_millis();
    if minutes > 0 {
        return format!("{}min {}.{}s", minutes, sub_sec, sub_milli);
    }
    format!("{}.{}s", sub_sec, sub_milli)
}

/// Case-insensitive substring match on the first token of a CSV/header line,
/// mirroring the tokenizing style used throughout the event-file readers.
pub fn compare_case_insensitive(reference: &str, token: &str, starts_with_ok: bool) -> bool {
    let t = token.trim().to_lowercase();
    let r = reference.to_lowercase();
    if starts_with_ok {
        t.starts_with(&r)
    } else {
        t == r
    }
}

/// Splits a single CSV line into trimmed, quote-stripped tokens. Empty
/// lines produce an empty vector, which callers treat as "skip this line".
pub fn csv_line_tokens(line: &str) -> Vec<String> {
    line.split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_tokens_strip_quotes_and_whitespace() {
        let toks = csv_line_tokens(r#" "Event Name" , 1 "#);
        assert_eq!(toks, vec!["Event Name".to_string(), "1".to_string()]);
    }

    #[test]
    fn compare_case_insensitive_prefix() {
        assert!(compare_case_insensitive("inflow", "Inflow", true));
        assert!(!compare_case_insensitive("inflow", "Outflow", true));
    }
}
