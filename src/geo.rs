//! Geodetic primitives and planar rupture surfaces.
//!
//! Only the numeric contracts the hazard core relies on: great-circle
//! distances on a spherical earth, azimuths, and distance metrics from a
//! discretised rupture plane to a site.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
    /// Kilometres, positive downwards.
    pub depth: f64,
}

impl Point {
    pub fn new(lon: f64, lat: f64, depth: f64) -> Self {
        Self { lon, lat, depth }
    }

    pub fn surface(lon: f64, lat: f64) -> Self {
        Self { lon, lat, depth: 0.0 }
    }

    /// Great-circle distance between the surface projections, in km.
    pub fn epicentral_distance(&self, other: &Point) -> f64 {
        geodetic_distance(self.lon, self.lat, other.lon, other.lat)
    }

    /// Straight-line distance accounting for depth, in km.
    pub fn distance(&self, other: &Point) -> f64 {
        let h = self.epicentral_distance(other);
        let v = self.depth - other.depth;
        (h * h + v * v).sqrt()
    }

    pub fn azimuth_to(&self, other: &Point) -> f64 {
        azimuth(self.lon, self.lat, other.lon, other.lat)
    }

    /// Point reached travelling `horizontal_km` along `azimuth_deg` and
    /// `vertical_km` downwards.
    pub fn point_at(&self, horizontal_km: f64, vertical_km: f64, azimuth_deg: f64) -> Point {
        let (lon, lat) = point_at(self.lon, self.lat, azimuth_deg, horizontal_km);
        Point::new(lon, lat, self.depth + vertical_km)
    }
}

/// Haversine great-circle distance in km.
pub fn geodetic_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let a = ((lat1 - lat2) / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * ((lon1 - lon2) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Azimuth from the first point to the second, degrees clockwise from north.
pub fn azimuth(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let cos_lat2 = lat2.cos();
    let true_course = ((lon1 - lon2).sin() * cos_lat2)
        .atan2(lat1.cos() * lat2.sin() - lat1.sin() * cos_lat2 * (lon1 - lon2).cos());
    (360.0 - true_course.to_degrees()).rem_euclid(360.0)
}

/// Destination point along a great circle.
pub fn point_at(lon: f64, lat: f64, azimuth_deg: f64, distance_km: f64) -> (f64, f64) {
    let lat_r = lat.to_radians();
    let lon_r = lon.to_radians();
    let tc = azimuth_deg.to_radians();
    let d = distance_km / EARTH_RADIUS_KM;
    let sin_lat = lat_r.sin() * d.cos() + lat_r.cos() * d.sin() * tc.cos();
    let lat2 = sin_lat.clamp(-1.0, 1.0).asin();
    let dlon = (tc.sin() * d.sin() * lat_r.cos()).atan2(d.cos() - lat_r.sin() * sin_lat);
    let lon2 = lon_r + dlon;
    let mut lon2 = lon2.to_degrees();
    if lon2 > 180.0 {
        lon2 -= 360.0;
    } else if lon2 < -180.0 {
        lon2 += 360.0;
    }
    (lon2, lat2.to_degrees())
}

/// Angular degrees spanned by `distance_km` of latitude.
pub fn km_to_degrees(distance_km: f64) -> f64 {
    (distance_km / EARTH_RADIUS_KM).to_degrees()
}

/// Longitude degrees spanned by `distance_km` at the given latitude.
pub fn longitude_extent(distance_km: f64, lat: f64) -> f64 {
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    km_to_degrees(distance_km) / cos_lat
}

// =============================================================================
// Planar surface
// =============================================================================

/// A rectangular rupture plane described by its four corners
/// (top-left, top-right, bottom-right, bottom-left looking along strike).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarSurface {
    pub strike: f64,
    pub dip: f64,
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
    /// Spacing of the distance mesh, km.
    pub mesh_spacing: f64,
}

impl PlanarSurface {
    /// Builds a plane centred on `hypocenter` with the given dimensions,
    /// shifted and clipped so that it lies between the seismogenic depths.
    pub fn from_hypocenter(
        hypocenter: Point,
        strike: f64,
        dip: f64,
        length: f64,
        width: f64,
        upper_seismogenic_depth: f64,
        lower_seismogenic_depth: f64,
        mesh_spacing: f64,
    ) -> Self {
        let dip_r = dip.to_radians();
        let seismogenic = (lower_seismogenic_depth - upper_seismogenic_depth).max(0.0);
        let max_width = if dip_r.sin() > 0.0 { seismogenic / dip_r.sin() } else { width };
        let width = width.min(max_width);

        let vertical = width * dip_r.sin();
        let horizontal = width * dip_r.cos();

        // Centre of the plane, shifted inside the seismogenic layer
        let mut top_depth = hypocenter.depth - vertical / 2.0;
        let mut shift = 0.0;
        if top_depth < upper_seismogenic_depth {
            shift = upper_seismogenic_depth - top_depth;
            top_depth = upper_seismogenic_depth;
        } else if top_depth + vertical > lower_seismogenic_depth {
            shift = lower_seismogenic_depth - vertical - top_depth;
            top_depth = lower_seismogenic_depth - vertical;
        }
        let dip_direction = (strike + 90.0).rem_euclid(360.0);
        let centre = if shift != 0.0 && dip_r.tan().abs() > 1e-9 {
            hypocenter.point_at(shift / dip_r.tan(), 0.0, dip_direction)
        } else {
            hypocenter
        };

        let top_centre = centre.point_at(horizontal / 2.0, 0.0, (dip_direction + 180.0).rem_euclid(360.0));
        let top_centre = Point::new(top_centre.lon, top_centre.lat, top_depth);
        let top_left = top_centre.point_at(length / 2.0, 0.0, (strike + 180.0).rem_euclid(360.0));
        let top_right = top_centre.point_at(length / 2.0, 0.0, strike);
        let bottom_left = top_left.point_at(horizontal, vertical, dip_direction);
        let bottom_right = top_right.point_at(horizontal, vertical, dip_direction);

        Self {
            strike,
            dip,
            top_left,
            top_right,
            bottom_right,
            bottom_left,
            mesh_spacing: mesh_spacing.max(0.1),
        }
    }

    pub fn length(&self) -> f64 {
        self.top_left.distance(&self.top_right)
    }

    pub fn width(&self) -> f64 {
        self.top_left.distance(&self.bottom_left)
    }

    pub fn top_edge_depth(&self) -> f64 {
        self.top_left.depth.min(self.top_right.depth)
    }

    pub fn centroid(&self) -> Point {
        let corners = [self.top_left, self.top_right, self.bottom_right, self.bottom_left];
        let n = corners.len() as f64;
        Point::new(
            corners.iter().map(|p| p.lon).sum::<f64>() / n,
            corners.iter().map(|p| p.lat).sum::<f64>() / n,
            corners.iter().map(|p| p.depth).sum::<f64>() / n,
        )
    }

    /// Mesh nodes by bilinear interpolation of the corners.
    pub fn mesh(&self) -> Vec<Point> {
        let along = ((self.length() / self.mesh_spacing).ceil() as usize).max(1);
        let down = ((self.width() / self.mesh_spacing).ceil() as usize).max(1);
        let mut nodes = Vec::with_capacity((along + 1) * (down + 1));
        for j in 0..=down {
            let v = j as f64 / down as f64;
            for i in 0..=along {
                let u = i as f64 / along as f64;
                let lerp = |a: f64, b: f64, c: f64, d: f64| {
                    (1.0 - v) * ((1.0 - u) * a + u * b) + v * ((1.0 - u) * d + u * c)
                };
                nodes.push(Point::new(
                    lerp(self.top_left.lon, self.top_right.lon, self.bottom_right.lon, self.bottom_left.lon),
                    lerp(self.top_left.lat, self.top_right.lat, self.bottom_right.lat, self.bottom_left.lat),
                    lerp(
                        self.top_left.depth,
                        self.top_right.depth,
                        self.bottom_right.depth,
                        self.bottom_left.depth,
                    ),
                ));
            }
        }
        nodes
    }

    /// Closest distance to the rupture plane.
    pub fn rrup(&self, site: &Point) -> f64 {
        self.mesh()
            .iter()
            .map(|node| node.distance(site))
            .fold(f64::INFINITY, f64::min)
    }

    /// Closest distance to the surface projection of the plane.
    pub fn rjb(&self, site: &Point) -> f64 {
        self.mesh()
            .iter()
            .map(|node| node.epicentral_distance(site))
            .fold(f64::INFINITY, f64::min)
    }
}
