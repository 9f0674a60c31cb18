use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default)]
    pub second: f64,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(default)]
    pub depth: f64,
    pub magnitude: f64,
}

impl Event {
    /// Event at midnight of the given date.
    pub fn on(year: i32, month: u32, day: u32, longitude: f64, latitude: f64, magnitude: f64) -> Self {
        Self {
            year,
            month,
            day,
            hour: 0,
            minute: 0,
            second: 0.0,
            longitude,
            latitude,
            depth: 0.0,
            magnitude,
        }
    }

    pub fn decimal_year(&self) -> Result<f64> {
        decimal_year(self.year, self.month, self.day, self.hour, self.minute, self.second)
    }
}

/// Fractional year of an instant, leap years included.
pub fn decimal_year(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: f64) -> Result<f64> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::config("catalogue", format!("invalid date {}-{}-{}", year, month, day)))?;
    if hour > 23 || minute > 59 || !(0.0..60.0).contains(&second) {
        return Err(Error::config(
            "catalogue",
            format!("invalid time {}:{}:{} on {}", hour, minute, second, date),
        ));
    }
    let days_in_year = if date.leap_year() { 366.0 } else { 365.0 };
    let seconds = hour as f64 * 3600.0 + minute as f64 * 60.0 + second;
    Ok(year as f64 + (date.ordinal0() as f64 + seconds / 86_400.0) / days_in_year)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    pub events: Vec<Event>,
}

impl Catalogue {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        self.events.iter().map(|e| e.magnitude).collect()
    }

    pub fn decimal_years(&self) -> Result<Vec<f64>> {
        self.events.iter().map(Event::decimal_year).collect()
    }

    /// Sub-catalogue of the events whose mask entry is true.
    pub fn select(&self, mask: &[bool]) -> Catalogue {
        Catalogue {
            events: self
                .events
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(e, _)| e.clone())
                .collect(),
        }
    }
}
