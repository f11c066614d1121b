// 💰 Value Formatter - "K" / "KK" abbreviations
//
// Two deliberately different styles:
// - per-item prices truncate to whole units ("2K", "1KK")
// - the inventory total keeps two decimals ("1.50KK")

const THOUSAND: f64 = 1_000.0;
const MILLION: f64 = 1_000_000.0;

/// Per-item style: truncate to an integer, then integer-divide
pub fn format_item(value: f64) -> String {
    let value = value as i64;

    if value >= 1_000_000 {
        format!("{}KK", value / 1_000_000)
    } else if value >= 1_000 {
        format!("{}K", value / 1_000)
    } else {
        value.to_string()
    }
}

/// Aggregate style: divide and round to two decimals
pub fn format_total(value: f64) -> String {
    // -0.0 becomes 0.0
    let value = value + 0.0;

    if value >= MILLION {
        format!("{:.2}KK", value / MILLION)
    } else if value >= THOUSAND {
        format!("{:.2}K", value / THOUSAND)
    } else {
        format!("{:.2}", value)
    }
}
