use astro::angle::{anglr_sepr, limit_to_two_PI};
use astro::time::{julian_day, mn_sidr, CalType, Date};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Equatorial coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Equatorial {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

impl Equatorial {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Self {
        Equatorial { ra_deg, dec_deg }
    }

    /// Great-circle separation to another position, in degrees.
    pub fn separation_deg(&self, other: &Equatorial) -> f64 {
        anglr_sepr(
            self.ra_deg.to_radians(),
            self.dec_deg.to_radians(),
            other.ra_deg.to_radians(),
            other.dec_deg.to_radians(),
        )
        .to_degrees()
    }
}

/// Observing site, as much of it as the hour-angle computation needs.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Observer {
    pub latitude_deg: f64,
    /// East-positive longitude.
    pub longitude_deg: f64,
}

impl Observer {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Observer {
            latitude_deg,
            longitude_deg,
        }
    }

    /// Hour angle of `target` at `time`, in degrees.
    ///
    /// Wrapped to (-90, 270] so a series that crosses the meridian stays
    /// continuous instead of jumping by 360.
    pub fn hour_angle_deg(&self, time: DateTime<Utc>, target: &Equatorial) -> f64 {
        let gmst = greenwich_mean_sidereal_time(time);
        let ha = gmst + self.longitude_deg.to_radians() - target.ra_deg.to_radians();
        let mut ha_deg = limit_to_two_PI(ha).to_degrees();
        if ha_deg > 270.0 {
            ha_deg -= 360.0;
        }
        ha_deg
    }
}

/// Greenwich mean sidereal time, in radians.
fn greenwich_mean_sidereal_time(time: DateTime<Utc>) -> f64 {
    let date = Date {
        year: time.date_naive().year() as i16,
        month: time.date_naive().month() as u8,
        decimal_day: time.date_naive().day() as f64,
        cal_type: CalType::Gregorian,
    };
    let jd = julian_day(&date);

    let utc_hours = time.time().num_seconds_from_midnight() as f64 / 3600.0;
    // Sidereal runs fast on UT by the usual 1.0027379 ratio
    let gmst_hours = mn_sidr(jd).to_degrees() / 15.0 + utc_hours * 1.00273790935;

    limit_to_two_PI((gmst_hours * 15.0).to_radians())
}
