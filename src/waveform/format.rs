// Waveform file codec
//
// Layout: `header_lines` opaque lines copied byte-for-byte, then one
// `time,voltage` row per sample. Time is written like C's `%.7E`, voltage
// like `%f`.

use super::WaveformRecord;
use crate::error::WaveformError;

/// Parse a waveform file body
///
/// The first `header_lines` lines (terminators included) become the header.
/// Blank rows after the header are skipped.
pub fn parse_waveform(bytes: &[u8], header_lines: usize) -> Result<WaveformRecord, WaveformError> {
    let mut rest = bytes;
    let mut header_len = 0;
    for line in 0..header_lines {
        match rest.iter().position(|&b| b == b'\n') {
            Some(end) => {
                header_len += end + 1;
                rest = &rest[end + 1..];
            }
            None => {
                return Err(WaveformError::Parse {
                    line: line + 1,
                    reason: format!("expected {} header lines", header_lines),
                })
            }
        }
    }

    let mut time = Vec::new();
    let mut voltage = Vec::new();
    for (offset, raw_line) in rest.split(|&b| b == b'\n').enumerate() {
        let line_number = header_lines + offset + 1;
        let text = std::str::from_utf8(raw_line)
            .map_err(|_| WaveformError::Parse {
                line: line_number,
                reason: "row is not ASCII text".to_string(),
            })?
            .trim();
        if text.is_empty() {
            continue;
        }
        let (t, v) = text.split_once(',').ok_or_else(|| WaveformError::Parse {
            line: line_number,
            reason: format!("expected 'time,voltage', got '{}'", text),
        })?;
        time.push(parse_value(t, line_number)?);
        voltage.push(parse_value(v, line_number)?);
    }

    WaveformRecord::new(time, voltage, bytes[..header_len].to_vec())
}

fn parse_value(field: &str, line: usize) -> Result<f64, WaveformError> {
    field.trim().parse::<f64>().map_err(|e| WaveformError::Parse {
        line,
        reason: format!("'{}': {}", field.trim(), e),
    })
}

/// Serialize a record in the legacy layout
pub fn write_waveform(record: &WaveformRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(record.header().len() + record.len() * 28);
    out.extend_from_slice(record.header());
    for (t, v) in record.time().iter().zip(record.voltage()) {
        out.extend_from_slice(format_scientific(*t, 7).as_bytes());
        out.push(b',');
        out.extend_from_slice(format!("{:.6}", v).as_bytes());
        out.push(b'\n');
    }
    out
}

/// Format like C's `%.{decimals}E`: signed exponent of at least two digits
pub fn format_scientific(value: f64, decimals: usize) -> String {
    let text = format!("{:.*E}", decimals, value);
    match text.split_once('E') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}E{}{:02}", mantissa, sign, exp.abs())
            }
            Err(_) => text,
        },
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &[u8] = b"LECROYWR640Zi,52222,Waveform\nSegments,1,SegmentSize,4\nSegment,TrigTime,TimeSinceSegment1\n#1,01-Jan-2019 00:00:00,0\nTime,Ampl\n";

    #[test]
    fn test_format_scientific_matches_printf() {
        assert_eq!(format_scientific(-1.23456789e-9, 7), "-1.2345679E-09");
        assert_eq!(format_scientific(0.0, 7), "0.0000000E+00");
        assert_eq!(format_scientific(2.5e10, 7), "2.5000000E+10");
        assert_eq!(format_scientific(1.0e-100, 2), "1.00E-100");
    }

    #[test]
    fn test_round_trip_keeps_header_bytes() {
        let mut header = HEADER.to_vec();
        header[2] = 0xE9;
        let record = WaveformRecord::new(
            vec![-1.0e-9, -5.0e-10, 0.0, 5.0e-10],
            vec![0.000012, -0.004, -0.01, 0.0005],
            header.clone(),
        )
        .unwrap();

        let bytes = write_waveform(&record);
        let text_rows = String::from_utf8_lossy(&bytes[header.len()..]).to_string();
        assert_eq!(
            text_rows,
            "-1.0000000E-09,0.000012\n-5.0000000E-10,-0.004000\n0.0000000E+00,-0.010000\n5.0000000E-10,0.000500\n"
        );

        let parsed = parse_waveform(&bytes, 5).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.header(), header.as_slice());
    }

    #[test]
    fn test_parse_tolerates_crlf_and_trailing_blank() {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(b"1.0E-09,0.5\r\n2.0E-09,0.25\r\n\r\n");
        let record = parse_waveform(&bytes, 5).unwrap();
        assert_eq!(record.time(), &[1.0e-9, 2.0e-9]);
        assert_eq!(record.voltage(), &[0.5, 0.25]);
    }

    #[test]
    fn test_parse_reports_bad_row() {
        let mut bytes = HEADER.to_vec();
        bytes.extend_from_slice(b"1.0E-09,0.5\nnot-a-number,0.1\n");
        let err = parse_waveform(&bytes, 5).unwrap_err();
        assert!(matches!(err, WaveformError::Parse { line: 7, .. }));
    }

    #[test]
    fn test_parse_missing_header() {
        let err = parse_waveform(b"only one line\n", 5).unwrap_err();
        assert!(matches!(err, WaveformError::Parse { line: 2, .. }));
    }
}
