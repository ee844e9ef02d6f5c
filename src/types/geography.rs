//! Geographic point and polygon values
//!
//! Both types parse from and print to OGC Well Known Text. Polygons keep
//! their rings exactly as given (outer ring first, every ring closed), so
//! that comparisons see the vertex order the engine produced.

use std::fmt;

use thiserror::Error;

/// WKT parse failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeographyParseError {
    #[error("expected {expected} in WKT: {text}")]
    Syntax { expected: &'static str, text: String },

    #[error("invalid coordinate '{0}' in WKT")]
    Coordinate(String),

    #[error("polygon ring {ring} must contain at least 4 points, found {count}")]
    RingTooShort { ring: usize, count: usize },

    #[error("polygon ring {ring} is not closed (first vertex differs from last)")]
    RingNotClosed { ring: usize },
}

/// A point on the earth's surface, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographyPoint {
    longitude: f64,
    latitude: f64,
}

impl GeographyPoint {
    /// Create a point from longitude and latitude (in that order, as in WKT)
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Parse `POINT(lng lat)`
    pub fn from_wkt(text: &str) -> Result<Self, GeographyParseError> {
        let body = strip_keyword(text, "POINT")?;
        let inner = strip_parens(body, text)?;
        parse_coordinate_pair(inner)
    }

    fn format_lng_lat(&self) -> String {
        format!(
            "{} {}",
            format_coordinate(self.longitude),
            format_coordinate(self.latitude)
        )
    }
}

impl fmt::Display for GeographyPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT ({})", self.format_lng_lat())
    }
}

/// A polygon: one outer ring followed by zero or more holes
#[derive(Debug, Clone, PartialEq)]
pub struct Geography {
    rings: Vec<Vec<GeographyPoint>>,
}

impl Geography {
    /// Create a polygon from closed rings, validating each one
    pub fn new(rings: Vec<Vec<GeographyPoint>>) -> Result<Self, GeographyParseError> {
        for (idx, ring) in rings.iter().enumerate() {
            if ring.len() < 4 {
                return Err(GeographyParseError::RingTooShort {
                    ring: idx,
                    count: ring.len(),
                });
            }
            if ring.first() != ring.last() {
                return Err(GeographyParseError::RingNotClosed { ring: idx });
            }
        }
        if rings.is_empty() {
            return Err(GeographyParseError::Syntax {
                expected: "at least one ring",
                text: String::new(),
            });
        }
        Ok(Self { rings })
    }

    /// Parse `POLYGON((lng lat, ...), (lng lat, ...))`
    pub fn from_wkt(text: &str) -> Result<Self, GeographyParseError> {
        let body = strip_keyword(text, "POLYGON")?;
        let mut rest = strip_parens(body, text)?.trim();
        let mut rings = Vec::new();

        loop {
            if !rest.starts_with('(') {
                return Err(GeographyParseError::Syntax {
                    expected: "'(' to open a ring",
                    text: text.to_string(),
                });
            }
            let end = rest.find(')').ok_or_else(|| GeographyParseError::Syntax {
                expected: "')' to close a ring",
                text: text.to_string(),
            })?;
            let ring = rest[1..end]
                .split(',')
                .map(parse_coordinate_pair)
                .collect::<Result<Vec<_>, _>>()?;
            rings.push(ring);

            rest = rest[end + 1..].trim();
            if rest.is_empty() {
                break;
            }
            rest = rest
                .strip_prefix(',')
                .ok_or_else(|| GeographyParseError::Syntax {
                    expected: "',' between rings",
                    text: text.to_string(),
                })?
                .trim();
        }

        Self::new(rings)
    }

    /// Rings in traversal order, each closed
    pub fn rings(&self) -> &[Vec<GeographyPoint>] {
        &self.rings
    }
}

impl fmt::Display for Geography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("POLYGON (")?;
        for (idx, ring) in self.rings.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            let points: Vec<String> = ring.iter().map(|p| p.format_lng_lat()).collect();
            write!(f, "({})", points.join(", "))?;
        }
        f.write_str(")")
    }
}

/// Up to 12 fractional digits, at least one
fn format_coordinate(v: f64) -> String {
    let s = format!("{:.12}", v);
    let trimmed = s.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{}0", trimmed)
    } else {
        trimmed.to_string()
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &'static str) -> Result<&'a str, GeographyParseError> {
    let trimmed = text.trim();
    let head = trimmed.get(..keyword.len()).unwrap_or("");
    if !head.eq_ignore_ascii_case(keyword) {
        return Err(GeographyParseError::Syntax {
            expected: keyword,
            text: text.to_string(),
        });
    }
    Ok(trimmed[keyword.len()..].trim())
}

fn strip_parens<'a>(body: &'a str, text: &str) -> Result<&'a str, GeographyParseError> {
    body.strip_prefix('(')
        .and_then(|b| b.strip_suffix(')'))
        .ok_or_else(|| GeographyParseError::Syntax {
            expected: "parenthesized coordinates",
            text: text.to_string(),
        })
}

fn parse_coordinate_pair(text: &str) -> Result<GeographyPoint, GeographyParseError> {
    let mut parts = text.split_whitespace();
    let mut next = || -> Result<f64, GeographyParseError> {
        let part = parts
            .next()
            .ok_or_else(|| GeographyParseError::Coordinate(text.trim().to_string()))?;
        part.parse::<f64>()
            .map_err(|_| GeographyParseError::Coordinate(part.to_string()))
    };
    let longitude = next()?;
    let latitude = next()?;
    if parts.next().is_some() {
        return Err(GeographyParseError::Coordinate(text.trim().to_string()));
    }
    Ok(GeographyPoint::new(longitude, latitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_wkt() {
        let p = GeographyPoint::from_wkt("point(-71.5 42.25)").unwrap();
        assert_eq!(p.longitude(), -71.5);
        assert_eq!(p.latitude(), 42.25);
        assert_eq!(p.to_string(), "POINT (-71.5 42.25)");
    }

    #[test]
    fn test_point_wkt_rejects_garbage() {
        assert!(GeographyPoint::from_wkt("POINT(1)").is_err());
        assert!(GeographyPoint::from_wkt("POINT(1 2 3)").is_err());
        assert!(GeographyPoint::from_wkt("LINESTRING(1 2)").is_err());
    }

    #[test]
    fn test_polygon_with_hole() {
        let wkt = "POLYGON((0 0, 10 0, 10 10, 0 10, 0 0), (2 2, 2 3, 3 3, 3 2, 2 2))";
        let poly = Geography::from_wkt(wkt).unwrap();
        assert_eq!(poly.rings().len(), 2);
        assert_eq!(poly.rings()[1].len(), 5);
        assert_eq!(
            poly.to_string(),
            "POLYGON ((0.0 0.0, 10.0 0.0, 10.0 10.0, 0.0 10.0, 0.0 0.0), \
             (2.0 2.0, 2.0 3.0, 3.0 3.0, 3.0 2.0, 2.0 2.0))"
        );
    }

    #[test]
    fn test_polygon_ring_validation() {
        assert_eq!(
            Geography::from_wkt("POLYGON((0 0, 1 0, 0 0))"),
            Err(GeographyParseError::RingTooShort { ring: 0, count: 3 })
        );
        assert_eq!(
            Geography::from_wkt("POLYGON((0 0, 1 0, 1 1, 0 1))"),
            Err(GeographyParseError::RingNotClosed { ring: 0 })
        );
    }
}
