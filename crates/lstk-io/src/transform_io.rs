//! RAS 4×4 affine matrix files.
//!
//! Plain text, one row per line, whitespace separated. This is the format
//! greedy reads and writes for `-a` registrations.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nalgebra::Matrix4;

pub fn read_affine<P: AsRef<Path>>(path: P) -> Result<Matrix4<f64>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("failed to read matrix file {}", path.display()))?;
    parse_affine(&text).with_context(|| format!("malformed matrix file {}", path.display()))
}

pub fn write_affine<P: AsRef<Path>>(path: P, matrix: &Matrix4<f64>) -> Result<()> {
    let path = path.as_ref();
    let mut text = String::new();
    for r in 0..4 {
        let row: Vec<String> = (0..4).map(|c| format!("{}", matrix[(r, c)])).collect();
        text.push_str(&row.join(" "));
        text.push('\n');
    }
    fs::write(path, text).with_context(|| format!("failed to write matrix file {}", path.display()))
}

fn parse_affine(text: &str) -> Result<Matrix4<f64>> {
    let rows: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if rows.len() != 4 {
        bail!("expected 4 rows, found {}", rows.len());
    }

    let mut m = Matrix4::zeros();
    for (r, line) in rows.iter().enumerate() {
        let values = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("row {} is not numeric", r + 1))?;
        if values.len() != 4 {
            bail!("row {} has {} columns, expected 4", r + 1, values.len());
        }
        for (c, v) in values.into_iter().enumerate() {
            m[(r, c)] = v;
        }
    }
    Ok(m)
}
