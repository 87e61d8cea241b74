use std::fmt;

use shared::domain::{BillingPeriod, Offering};

const WEEKS_PER_YEAR: f64 = 52.0;
const FALLBACK_PERCENT_SAVED: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallToAction {
    StartFreeTrial,
    UnlockNow,
}

impl CallToAction {
    pub fn for_offering(offering: Option<&Offering>) -> Self {
        match offering {
            Some(offering) if offering.has_trial => CallToAction::StartFreeTrial,
            _ => CallToAction::UnlockNow,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CallToAction::StartFreeTrial => "Start Free Trial",
            CallToAction::UnlockNow => "Unlock Now",
        }
    }
}

impl fmt::Display for CallToAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Savings {
    /// Weekly price over a year; `None` without a parseable weekly plan.
    pub annualized_weekly: Option<f64>,
    pub percent_saved: u32,
}

impl Savings {
    pub fn from_offerings(offerings: &[Offering]) -> Self {
        Self {
            annualized_weekly: annualized_weekly_price(offerings),
            percent_saved: percentage_saved(offerings),
        }
    }
}

/// Reads a storefront price such as `"$4.99"` or `"1,299.00 kr"`.
///
/// Only `.` is treated as the decimal separator.
pub fn parse_price(display_price: &str) -> Option<f64> {
    let digits: String = display_price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let digits = digits.trim_matches('.');
    if digits.is_empty() {
        return None;
    }
    digits.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn annualized_weekly_price(offerings: &[Offering]) -> Option<f64> {
    offerings
        .iter()
        .find(|offering| offering.period == BillingPeriod::Week)
        .and_then(|weekly| parse_price(&weekly.display_price))
        .map(|weekly| weekly * WEEKS_PER_YEAR)
}

pub fn percentage_saved(offerings: &[Offering]) -> u32 {
    let Some(full_price) = annualized_weekly_price(offerings).filter(|price| *price > 0.0) else {
        return FALLBACK_PERCENT_SAVED;
    };
    let Some(lifetime) = offerings
        .iter()
        .find(|offering| offering.period == BillingPeriod::Lifetime)
        .and_then(|lifetime| parse_price(&lifetime.display_price))
    else {
        return FALLBACK_PERCENT_SAVED;
    };

    let saved = (100.0 - (lifetime / full_price) * 100.0).trunc();
    if saved > 0.0 {
        saved as u32
    } else {
        FALLBACK_PERCENT_SAVED
    }
}

/// Formats `value` with the currency prefix or suffix found around the digits of `template`.
pub fn format_like(template: &str, value: f64) -> String {
    let first_digit = template.find(|c: char| c.is_ascii_digit());
    let last_digit = template.rfind(|c: char| c.is_ascii_digit());
    match (first_digit, last_digit) {
        (Some(first), Some(last)) => format!(
            "{}{value:.2}{}",
            &template[..first],
            &template[last + 1..]
        ),
        _ => format!("{value:.2}"),
    }
}
