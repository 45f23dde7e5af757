//! ============================================================================
//! XPT Reader - SAS transport (XPORT v5) files
//! ============================================================================
//! NHANES distributes its tables as SAS transport files: a sequence of
//! 80-byte records. A LIBRARY header opens the file, a MEMBER header
//! describes the dataset, NAMESTR entries (140 bytes each, big-endian)
//! describe the variables, and after the OBS header the observations follow
//! as fixed-width rows. Numeric values use IBM System/360 floating point;
//! missing values are sentinel bytes ('.', '_' or 'A'-'Z').
//! ============================================================================

use anyhow::{anyhow, bail, Result};
use std::path::{Path, PathBuf};

/// Transport files are sequences of 80-byte records
const RECORD_LEN: usize = 80;

/// 2^56, the denominator of the IBM mantissa
const IBM_MANTISSA_DENOM: f64 = 72_057_594_037_927_936.0;

/// One variable described by a NAMESTR entry
#[derive(Debug, Clone)]
pub struct XptVariable {
    pub name: String,
    pub label: String,
    pub is_numeric: bool,
    /// Field length in the observation record
    pub length: usize,
    /// Byte offset of the field within the row
    pub position: usize,
    /// 1-based variable number (column order)
    pub number: usize,
}

/// A parsed cell
#[derive(Debug, Clone, PartialEq)]
pub enum XptValue {
    Number(f64),
    Text(String),
    Missing,
}

/// A parsed transport dataset
#[derive(Debug, Clone)]
pub struct XptDataset {
    pub name: String,
    pub variables: Vec<XptVariable>,
    pub rows: Vec<Vec<XptValue>>,
}

/// Summary of a conversion
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub csv_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
}

/// Parse a transport file from memory
pub fn parse(data: &[u8]) -> Result<XptDataset> {
    let first = record(data, 0)?;
    if !first.starts_with(b"HEADER RECORD*******LIBRARY HEADER RECORD") {
        bail!("not a SAS transport file (missing LIBRARY header record)");
    }

    let member_idx = find_header(data, b"HEADER RECORD*******MEMBER")?;
    let namestr_len = trailing_number(record(data, member_idx)?, 5)
        .ok_or_else(|| anyhow!("MEMBER header carries no NAMESTR entry length"))?;
    if namestr_len < 88 {
        bail!("unsupported NAMESTR entry length: {}", namestr_len);
    }

    // Dataset name lives at bytes 8..16 of the first member data record.
    let name = ascii(&record(data, member_idx + 2)?[8..16]).trim().to_string();

    let namestr_idx = find_header(data, b"HEADER RECORD*******NAMESTR")?;
    let nvars: usize = ascii(&record(data, namestr_idx)?[54..58])
        .trim()
        .parse()
        .map_err(|_| anyhow!("NAMESTR header carries no variable count"))?;
    if nvars == 0 {
        bail!("transport file declares zero variables");
    }

    let entries_start = (namestr_idx + 1) * RECORD_LEN;
    let entries_end = entries_start + nvars * namestr_len;
    if entries_end > data.len() {
        bail!("truncated NAMESTR section");
    }

    let mut variables = Vec::with_capacity(nvars);
    for i in 0..nvars {
        let entry = &data[entries_start + i * namestr_len..entries_start + (i + 1) * namestr_len];
        variables.push(parse_namestr(entry)?);
    }
    variables.sort_by_key(|v| v.number);

    let obs_idx = find_header(data, b"HEADER RECORD*******OBS")?;
    let body = &data[(obs_idx + 1) * RECORD_LEN..];

    let row_len: usize = variables.iter().map(|v| v.length).sum();
    if row_len == 0 {
        bail!("observation record length is zero");
    }

    let mut rows = Vec::new();
    let mut offset = 0;
    while offset + row_len <= body.len() {
        let row_bytes = &body[offset..offset + row_len];
        // The final record is padded with blanks; an all-blank row marks the end.
        if row_bytes.iter().all(|&b| b == b' ') {
            break;
        }
        rows.push(parse_row(row_bytes, &variables)?);
        offset += row_len;
    }

    Ok(XptDataset {
        name,
        variables,
        rows,
    })
}

/// Convert one .XPT file to CSV next to it (or into `out_dir`)
pub fn convert_file(xpt_path: &Path, out_dir: Option<&Path>) -> Result<ConversionReport> {
    let data = std::fs::read(xpt_path)
        .map_err(|e| anyhow!("failed to read {}: {}", xpt_path.display(), e))?;
    let dataset = parse(&data)?;

    let out_dir = match out_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.to_path_buf()
        }
        None => xpt_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let stem = xpt_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("invalid file name: {}", xpt_path.display()))?;
    let csv_path = out_dir.join(format!("{}.csv", stem));

    let mut writer = csv::Writer::from_path(&csv_path)
        .map_err(|e| anyhow!("failed to create {}: {}", csv_path.display(), e))?;

    let header: Vec<&str> = dataset.variables.iter().map(|v| v.name.as_str()).collect();
    writer.write_record(&header)?;

    for row in &dataset.rows {
        let record: Vec<String> = row
            .iter()
            .map(|value| match value {
                XptValue::Number(n) => format_number(*n),
                XptValue::Text(s) => s.clone(),
                XptValue::Missing => String::new(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(ConversionReport {
        csv_path,
        rows: dataset.rows.len(),
        columns: dataset.variables.len(),
    })
}

/// Convert an IBM System/360 double (possibly truncated) to IEEE 754.
/// Returns None for SAS missing values.
pub fn ibm_to_f64(raw: &[u8]) -> Option<f64> {
    let mut buf = [0u8; 8];
    let n = raw.len().min(8);
    buf[..n].copy_from_slice(&raw[..n]);

    // Missing sentinels carry the marker in the first byte, rest zero.
    if buf[1..].iter().all(|&b| b == 0) {
        match buf[0] {
            0x00 => return Some(0.0),
            b'.' | b'_' | b'A'..=b'Z' => return None,
            _ => {}
        }
    }

    let sign = if buf[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (buf[0] & 0x7F) as i32 - 64;
    let mantissa = u64::from_be_bytes(buf) & 0x00FF_FFFF_FFFF_FFFF;
    if mantissa == 0 {
        return Some(0.0);
    }

    let fraction = mantissa as f64 / IBM_MANTISSA_DENOM;
    Some(sign * fraction * 16f64.powi(exponent))
}

fn parse_namestr(entry: &[u8]) -> Result<XptVariable> {
    let ntype = be_u16(&entry[0..2]);
    if ntype != 1 && ntype != 2 {
        bail!("invalid NAMESTR variable type: {}", ntype);
    }

    Ok(XptVariable {
        name: ascii(&entry[8..16]).trim().to_string(),
        label: ascii(&entry[16..56]).trim().to_string(),
        is_numeric: ntype == 1,
        length: be_u16(&entry[4..6]) as usize,
        position: be_u32(&entry[84..88]) as usize,
        number: be_u16(&entry[6..8]) as usize,
    })
}

fn parse_row(row: &[u8], variables: &[XptVariable]) -> Result<Vec<XptValue>> {
    let mut values = Vec::with_capacity(variables.len());
    for var in variables {
        let end = var.position + var.length;
        let field = row
            .get(var.position..end)
            .ok_or_else(|| anyhow!("variable {} overruns the observation record", var.name))?;

        let value = if var.is_numeric {
            match ibm_to_f64(field) {
                Some(n) => XptValue::Number(n),
                None => XptValue::Missing,
            }
        } else {
            let text = ascii(field).trim_end().to_string();
            if text.is_empty() {
                XptValue::Missing
            } else {
                XptValue::Text(text)
            }
        };
        values.push(value);
    }
    Ok(values)
}

/// Integers print without a trailing ".0", everything else as-is
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn record(data: &[u8], index: usize) -> Result<&[u8]> {
    data.get(index * RECORD_LEN..(index + 1) * RECORD_LEN)
        .ok_or_else(|| anyhow!("truncated transport file at record {}", index))
}

fn find_header(data: &[u8], prefix: &[u8]) -> Result<usize> {
    (0..data.len() / RECORD_LEN)
        .find(|&i| data[i * RECORD_LEN..(i + 1) * RECORD_LEN].starts_with(prefix))
        .ok_or_else(|| {
            anyhow!(
                "missing {} record",
                String::from_utf8_lossy(prefix).trim_start_matches("HEADER RECORD*******")
            )
        })
}

/// Last `digits` characters of a trimmed header record, parsed as a number
fn trailing_number(rec: &[u8], digits: usize) -> Option<usize> {
    let text = ascii(rec);
    let trimmed = text.trim_end();
    if trimmed.len() < digits {
        return None;
    }
    trimmed[trimmed.len() - digits..].parse().ok()
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad80(text: &str) -> Vec<u8> {
        let mut bytes = text.as_bytes().to_vec();
        assert!(bytes.len() <= 80, "record too long: {}", text);
        bytes.resize(80, b' ');
        bytes
    }

    /// Encode a finite value as an IBM double (test fixture helper)
    fn f64_to_ibm(value: f64) -> [u8; 8] {
        if value == 0.0 {
            return [0; 8];
        }
        let sign: u8 = if value < 0.0 { 0x80 } else { 0 };
        let mut v = value.abs();
        let mut exp = 0i32;
        while v >= 1.0 {
            v /= 16.0;
            exp += 1;
        }
        while v < 1.0 / 16.0 {
            v *= 16.0;
            exp -= 1;
        }
        let mantissa = (v * IBM_MANTISSA_DENOM).round() as u64;
        let mut bytes = (mantissa & 0x00FF_FFFF_FFFF_FFFF).to_be_bytes();
        bytes[0] = sign | ((exp + 64) as u8);
        bytes
    }

    fn namestr(ntype: u16, length: u16, number: u16, name: &str, position: u32) -> Vec<u8> {
        let mut entry = vec![0u8; 140];
        entry[0..2].copy_from_slice(&ntype.to_be_bytes());
        entry[4..6].copy_from_slice(&length.to_be_bytes());
        entry[6..8].copy_from_slice(&number.to_be_bytes());
        let mut padded_name = name.as_bytes().to_vec();
        padded_name.resize(8, b' ');
        entry[8..16].copy_from_slice(&padded_name);
        entry[84..88].copy_from_slice(&position.to_be_bytes());
        entry
    }

    /// Build a minimal transport file: SEQN (numeric, 8) + GROUP (char, 8)
    fn sample_file(rows: &[(Option<f64>, &str)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(pad80(&format!(
            "HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!{}",
            "0".repeat(30)
        )));
        data.extend(pad80("SAS     SAS     SASLIB  9.4"));
        data.extend(pad80("01AUG26:12:00:00"));
        data.extend(pad80(
            "HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!000000000000000001600000000140",
        ));
        data.extend(pad80(&format!(
            "HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!{}",
            "0".repeat(30)
        )));
        data.extend(pad80("SAS     DEMO_J  SASDATA 9.4"));
        data.extend(pad80("01AUG26:12:00:00"));
        data.extend(pad80(&format!(
            "HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!0000000002{}",
            "0".repeat(20)
        )));

        let mut entries = Vec::new();
        entries.extend(namestr(1, 8, 1, "SEQN", 0));
        entries.extend(namestr(2, 8, 2, "GROUP", 8));
        while entries.len() % 80 != 0 {
            entries.push(b' ');
        }
        data.extend(entries);

        data.extend(pad80(&format!(
            "HEADER RECORD*******OBS     HEADER RECORD!!!!!!!{}",
            "0".repeat(30)
        )));

        let mut body = Vec::new();
        for (number, text) in rows {
            match number {
                Some(n) => body.extend(f64_to_ibm(*n)),
                None => {
                    body.push(b'.');
                    body.extend([0u8; 7]);
                }
            }
            let mut field = text.as_bytes().to_vec();
            field.resize(8, b' ');
            body.extend(field);
        }
        while body.len() % 80 != 0 {
            body.push(b' ');
        }
        data.extend(body);
        data
    }

    #[test]
    fn test_ibm_conversion_known_values() {
        assert_eq!(ibm_to_f64(&[0x41, 0x10, 0, 0, 0, 0, 0, 0]), Some(1.0));
        assert_eq!(ibm_to_f64(&[0x41, 0x20, 0, 0, 0, 0, 0, 0]), Some(2.0));
        assert_eq!(ibm_to_f64(&[0xC1, 0x10, 0, 0, 0, 0, 0, 0]), Some(-1.0));
        assert_eq!(ibm_to_f64(&[0x42, 0x64, 0, 0, 0, 0, 0, 0]), Some(100.0));
        assert_eq!(ibm_to_f64(&[0x40, 0x80, 0, 0, 0, 0, 0, 0]), Some(0.5));
        assert_eq!(ibm_to_f64(&[0; 8]), Some(0.0));
    }

    #[test]
    fn test_ibm_missing_sentinels() {
        assert_eq!(ibm_to_f64(&[b'.', 0, 0, 0, 0, 0, 0, 0]), None);
        assert_eq!(ibm_to_f64(&[b'_', 0, 0, 0, 0, 0, 0, 0]), None);
        assert_eq!(ibm_to_f64(&[b'A', 0, 0, 0, 0, 0, 0, 0]), None);
        assert_eq!(ibm_to_f64(&[b'Z', 0, 0, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn test_ibm_round_trip() {
        for value in [1.0, -1.0, 0.5, 100.0, 93703.0, 0.0625, 1234.5] {
            let encoded = f64_to_ibm(value);
            let decoded = ibm_to_f64(&encoded).unwrap();
            assert!(
                (decoded - value).abs() < 1e-9,
                "round trip failed for {}: got {}",
                value,
                decoded
            );
        }
    }

    #[test]
    fn test_ibm_truncated_field() {
        // A 2-byte numeric field is the shortest SAS allows.
        let full = f64_to_ibm(1.0);
        assert_eq!(ibm_to_f64(&full[..2]), Some(1.0));
    }

    #[test]
    fn test_parse_sample_file() {
        let data = sample_file(&[
            (Some(93703.0), "ADULTO"),
            (Some(93704.0), "JOVEN"),
            (None, "X"),
        ]);
        let dataset = parse(&data).unwrap();

        assert_eq!(dataset.name, "DEMO_J");
        assert_eq!(dataset.variables.len(), 2);
        assert_eq!(dataset.variables[0].name, "SEQN");
        assert!(dataset.variables[0].is_numeric);
        assert_eq!(dataset.variables[1].name, "GROUP");
        assert!(!dataset.variables[1].is_numeric);

        assert_eq!(dataset.rows.len(), 3);
        assert_eq!(dataset.rows[0][0], XptValue::Number(93703.0));
        assert_eq!(dataset.rows[0][1], XptValue::Text("ADULTO".to_string()));
        assert_eq!(dataset.rows[2][0], XptValue::Missing);
    }

    #[test]
    fn test_parse_rejects_non_xpt() {
        let data = vec![b'x'; 160];
        assert!(parse(&data).is_err());

        let html = pad80("<!DOCTYPE html><html><body>blocked</body></html>");
        assert!(parse(&html).is_err());
    }

    #[test]
    fn test_convert_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let xpt_path = dir.path().join("DEMO_J.xpt");
        std::fs::write(
            &xpt_path,
            sample_file(&[(Some(93703.0), "ADULTO"), (None, "JOVEN")]),
        )
        .unwrap();

        let report = convert_file(&xpt_path, None).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.columns, 2);

        let csv = std::fs::read_to_string(&report.csv_path).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "SEQN,GROUP");
        assert_eq!(lines.next().unwrap(), "93703,ADULTO");
        assert_eq!(lines.next().unwrap(), ",JOVEN");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(93703.0), "93703");
        assert_eq!(format_number(1.75), "1.75");
        assert_eq!(format_number(-12.0), "-12");
    }

    #[test]
    fn test_trailing_number() {
        let rec = pad80("HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!000000000000000001600000000140");
        assert_eq!(trailing_number(&rec, 5), Some(140));
    }
}
