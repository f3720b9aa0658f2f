/// Raw token amount to human-readable decimal conversion
///
/// Works on the decimal rendering of the integer so no precision is ever
/// lost and no floating point is involved, regardless of how large the
/// balance or the decimals value gets.
use ethers::types::U256;

/// Convert a raw ERC-20 balance into a decimal string given the token's
/// decimals. Trailing zeros after the point are trimmed; a zero balance is
/// always rendered as "0".
pub fn human_balance(raw: U256, decimals: u8) -> String {
    if raw.is_zero() {
        return "0".to_string();
    }

    let digits = raw.to_string();
    let d = decimals as usize;
    if d == 0 {
        return digits;
    }

    let (int_part, frac_part) = if digits.len() > d {
        let split = digits.len() - d;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        // Balance smaller than one whole unit: pad the fraction with
        // leading zeros up to the full decimals width.
        ("0".to_string(), format!("{:0>width$}", digits, width = d))
    };

    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac_trimmed)
    }
}
