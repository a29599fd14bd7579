use crate::models::Spike;

pub const EMPTY_REPORT: &str = "No mechanic spikes detected in the selected window.";

const HEADERS: [&str; 6] = ["Game", "Growth", "Current CCU", "Mechanic", "Source", "Published"];

/// `1234567` -> `"1,234,567"`.
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Plain-text table of spikes with padded columns.
pub fn format_spikes_table(spikes: &[Spike]) -> String {
    if spikes.is_empty() {
        return EMPTY_REPORT.to_string();
    }

    let mut rows: Vec<Vec<String>> = vec![
        HEADERS.iter().map(|h| h.to_string()).collect(),
        HEADERS.iter().map(|h| "-".repeat(h.len())).collect(),
    ];
    for spike in spikes {
        rows.push(vec![
            spike.name.clone(),
            format!("{:.1}%", spike.growth_percent),
            format_thousands(spike.current_metric),
            spike.mechanic_label.clone(),
            spike.source_url.clone(),
            spike.published_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }

    let widths: Vec<usize> = (0..HEADERS.len())
        .map(|col| rows.iter().map(|r| r[col].chars().count()).max().unwrap_or(0))
        .collect();

    rows.iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, &width)| format!("{:<width$}", cell, width = width))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
