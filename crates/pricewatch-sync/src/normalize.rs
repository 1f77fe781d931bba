//! Raw listing card -> canonical record.

use pricewatch_core::{
    Amount, Distributor, DistributorPrices, NormalizedRecord, RawRecord, NOT_AVAILABLE, NO_PRICE,
};
use uuid::Uuid;

const NBSP: char = '\u{a0}';

/// Parses listing price text such as `"$ 3.200"` into an integer amount.
///
/// The text must hold exactly one amount: an optional `$`, then digits grouped by `.`
/// (or a non-breaking space) thousands separators. Anything after a decimal comma is
/// dropped. Returns `None` for anything else, including text with two separate amounts.
pub fn parse_price(text: &str) -> Option<Amount> {
    let integral = text.split(',').next().unwrap_or_default();
    let mut amounts = integral
        .split(|c: char| c == '$' || (c.is_whitespace() && c != NBSP))
        .map(|group| group.trim_matches(NBSP))
        .filter(|group| !group.is_empty());
    let amount = amounts.next()?;
    if amounts.next().is_some() {
        return None;
    }
    if !amount.chars().all(|c| c.is_ascii_digit() || c == '.' || c == NBSP) {
        return None;
    }
    let digits = amount
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<Amount>().ok()
}

/// True when the card carried price text that could not be turned into an amount.
pub fn price_degraded(raw: &RawRecord) -> bool {
    raw.price_text
        .as_deref()
        .is_some_and(|text| parse_price(text).is_none())
}

fn text_or_sentinel(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn normalize(raw: &RawRecord, distributor: Distributor, category_id: Uuid) -> NormalizedRecord {
    let image_url = match raw.image_url.as_deref() {
        Some(url) if !url.trim().is_empty() => url.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    };
    let amount = raw
        .price_text
        .as_deref()
        .and_then(parse_price)
        .unwrap_or(NO_PRICE);

    NormalizedRecord {
        name: text_or_sentinel(raw.name.as_deref()),
        image_url,
        prices: DistributorPrices::only(distributor, amount),
        category_id,
    }
}
