use chrono::{DateTime, Timelike, Utc};

use crate::models::PriceInfo;

/// Clinic civil time. Brazil retired DST in 2019, so a fixed offset is exact
/// year-round.
const CLINIC_UTC_OFFSET_HOURS: i32 = -3;

const DAYTIME_RATE: f64 = 89.00;
const EVENING_RATE: f64 = 109.00;
const OVERNIGHT_RATE: f64 = 139.00;

/// Maps an instant to the flat rate charged for calls requested at that
/// time of day, in clinic-local civil time.
///
/// Three half-open bands partition the day; the overnight band wraps past
/// midnight and is the `else` arm, so every instant lands in exactly one
/// band. A boundary instant belongs to the band starting there: 13:00:00
/// local is `evening`. Pure and total; same instant, same price.
pub fn price_for_instant(now: DateTime<Utc>) -> PriceInfo {
    let local_hour = clinic_local_hour(now);

    let (amount, tier_label, time_slot_label) = if (7..13).contains(&local_hour) {
        (DAYTIME_RATE, "daytime", "07:00-12:59")
    } else if (13..21).contains(&local_hour) {
        (EVENING_RATE, "evening", "13:00-20:59")
    } else {
        (OVERNIGHT_RATE, "overnight", "21:00-06:59")
    };

    PriceInfo {
        amount,
        tier_label: tier_label.to_string(),
        time_slot_label: time_slot_label.to_string(),
        payment_url: None,
    }
}

// Bands start on the hour, so the local hour alone decides the tier.
fn clinic_local_hour(now: DateTime<Utc>) -> i32 {
    (now.hour() as i32 + 24 + CLINIC_UTC_OFFSET_HOURS) % 24
}
