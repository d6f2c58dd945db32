//! Coordinate reference systems: representation and detection.
//!
//! A CRS is carried as its proj4 definition plus the EPSG code when one
//! is known. EPSG codes are resolved through the crs-definitions
//! database; WKT and PROJJSON metadata are reduced to their EPSG
//! authority code rather than parsed in full.

use zarr_dataset::DataSource;

use crate::error::{ProviderError, Result};

/// A coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    /// EPSG code, when the CRS came from one.
    pub epsg: Option<u16>,
    /// proj4 definition.
    pub proj4: String,
}

impl Crs {
    /// Resolve an EPSG code through the crs-definitions database.
    pub fn from_epsg(code: u16) -> Result<Self> {
        let def = crs_definitions::from_code(code).ok_or_else(|| {
            ProviderError::invalid_data(format!("EPSG:{code} is not a known CRS"))
        })?;
        Ok(Self {
            epsg: Some(code),
            proj4: def.proj4.to_string(),
        })
    }

    /// Wrap a raw proj4 definition, validating that it parses.
    pub fn from_proj4(definition: &str) -> Result<Self> {
        proj4rs::proj::Proj::from_proj_string(definition).map_err(|e| {
            ProviderError::invalid_data(format!("invalid proj4 definition: {e:?}"))
        })?;
        Ok(Self {
            epsg: None,
            proj4: definition.trim().to_string(),
        })
    }

    /// Parse either an "EPSG:<code>" reference or a proj4 string.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if let Some(code) = value
            .strip_prefix("EPSG:")
            .or_else(|| value.strip_prefix("epsg:"))
        {
            let code: u16 = code.parse().map_err(|_| {
                ProviderError::invalid_data(format!("invalid EPSG code: {value}"))
            })?;
            return Self::from_epsg(code);
        }
        Self::from_proj4(value)
    }

    pub fn wgs84() -> Self {
        Self {
            epsg: Some(4326),
            proj4: crs_definitions::EPSG_4326.proj4.to_string(),
        }
    }

    /// Geographic (lon/lat) CRS need degree/radian conversion around
    /// proj4rs transforms.
    pub fn is_geographic(&self) -> bool {
        self.proj4.contains("+proj=longlat")
    }

    /// Two CRS are the same system when their proj4 definitions match.
    pub fn same_as(&self, other: &Crs) -> bool {
        self.proj4 == other.proj4
    }

    /// OGC CRS URI for response metadata.
    pub fn uri(&self) -> String {
        match self.epsg {
            Some(code) => format!("http://www.opengis.net/def/crs/EPSG/0/{code}"),
            None => "http://www.opengis.net/def/crs/OGC/1.3/CRS84".to_string(),
        }
    }
}

/// Determine the storage CRS of a dataset.
///
/// Tried in order: the configured override, a case-insensitive "crs"
/// variable's `spatial_ref`/`crs_wkt` attribute as WKT, the dataset
/// attributes as PROJJSON, a case-insensitive "proj4" dataset attribute.
/// A signal that is present but unparsable is an invalid-data error; only
/// the absence of all of them falls through to WGS84.
pub fn detect_storage_crs(
    source: &dyn DataSource,
    override_crs: Option<&str>,
) -> Result<Crs> {
    if let Some(value) = override_crs {
        return Crs::parse(value);
    }

    if let Some(name) = source
        .variable_names()
        .into_iter()
        .find(|n| n.eq_ignore_ascii_case("crs"))
    {
        let attrs = source.variable_attributes(&name)?;
        let wkt = attrs
            .get("spatial_ref")
            .or_else(|| attrs.get("crs_wkt"))
            .and_then(|v| v.as_str());
        if let Some(wkt) = wkt {
            let code = epsg_from_wkt(wkt).ok_or_else(|| {
                ProviderError::invalid_data(format!(
                    "crs variable WKT has no EPSG authority code: {wkt}"
                ))
            })?;
            return Crs::from_epsg(code);
        }
    }

    let attrs = source.attributes();
    if attrs
        .get("type")
        .and_then(|v| v.as_str())
        .is_some_and(|t| t.ends_with("CRS"))
    {
        let code = attrs
            .get("id")
            .and_then(|id| id.get("code"))
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
            .ok_or_else(|| {
                ProviderError::invalid_data(
                    "dataset attributes look like PROJJSON but carry no EPSG code",
                )
            })?;
        return Crs::from_epsg(code);
    }

    if let Some((_, value)) = attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("proj4"))
    {
        let definition = value.as_str().ok_or_else(|| {
            ProviderError::invalid_data("proj4 attribute is not a string")
        })?;
        return Crs::from_proj4(definition);
    }

    tracing::debug!("no CRS metadata found, assuming WGS84");
    Ok(Crs::wgs84())
}

/// Extract the EPSG code from the outermost AUTHORITY/ID node of a WKT
/// string. The outermost node is the last one in WKT serialization order.
fn epsg_from_wkt(wkt: &str) -> Option<u16> {
    let mut result = None;
    for token in ["AUTHORITY[", "ID["] {
        let mut rest = wkt;
        while let Some(pos) = rest.find(token) {
            let tail = &rest[pos + token.len()..];
            let Some(end) = tail.find(']') else { break };
            let mut parts = tail[..end].splitn(2, ',');
            let authority = parts.next().unwrap_or("").trim().trim_matches('"');
            let code = parts.next().unwrap_or("").trim().trim_matches('"');
            if authority.eq_ignore_ascii_case("EPSG") {
                if let Ok(code) = code.parse::<u16>() {
                    result = Some(code);
                }
            }
            rest = &tail[end..];
        }
        if result.is_some() {
            return result;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#;

    #[test]
    fn test_epsg_from_wkt_outermost_authority() {
        assert_eq!(epsg_from_wkt(WGS84_WKT), Some(4326));
    }

    #[test]
    fn test_epsg_from_wkt2_id_node() {
        let wkt = r#"PROJCRS["Web Mercator",ID["EPSG",3857]]"#;
        assert_eq!(epsg_from_wkt(wkt), Some(3857));
    }

    #[test]
    fn test_epsg_from_wkt_missing() {
        assert_eq!(epsg_from_wkt(r#"GEOGCS["local",DATUM["none"]]"#), None);
    }

    #[test]
    fn test_parse_epsg_reference() {
        let crs = Crs::parse("EPSG:4326").unwrap();
        assert_eq!(crs.epsg, Some(4326));
        assert!(crs.is_geographic());
    }

    #[test]
    fn test_parse_proj4_string() {
        let crs = Crs::parse("+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0").unwrap();
        assert_eq!(crs.epsg, None);
        assert!(!crs.is_geographic());
    }

    #[test]
    fn test_unknown_epsg_is_invalid_data() {
        assert!(matches!(
            Crs::from_epsg(1).unwrap_err(),
            ProviderError::InvalidData(_)
        ));
    }

    #[test]
    fn test_uri() {
        assert_eq!(
            Crs::wgs84().uri(),
            "http://www.opengis.net/def/crs/EPSG/0/4326"
        );
    }

    #[test]
    fn test_same_as_short_circuit() {
        let a = Crs::from_epsg(4326).unwrap();
        let b = Crs::wgs84();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Crs::from_epsg(3857).unwrap()));
    }
}
