/// Normalise a cell before it is used as a join key or parsed: ONS exports
/// sometimes pad `id_ons` and timestamps with spaces or keep them quoted, and
/// `" CJU_X1"` must still match the `CJU_X1` derived from the reference table.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a numeric cell. Empty cells are `Ok(None)`; a lone decimal comma
/// (`-9,4713`) is accepted.
pub fn parse_f64_cell(raw: &str) -> Result<Option<f64>, String> {
    let s = clean_str(raw);
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Ok(v) = s.parse::<f64>() {
        return Ok(Some(v));
    }
    if s.matches(',').count() == 1 && !s.contains('.') {
        if let Ok(v) = s.replace(',', ".").parse::<f64>() {
            return Ok(Some(v));
        }
    }
    Err(format!("not a number: {:?}", raw))
}
