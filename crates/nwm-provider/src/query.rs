//! Per-request query parameters.

use crate::bbox::BoundingBox;

/// Parameters of one query, as handed over by the hosting framework.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Spatial filter.
    pub bbox: Option<BoundingBox>,
    /// Datetime filter: an RFC 3339 instant or an `A/B` range where either
    /// bound may be `..`.
    pub datetime: Option<String>,
    /// Data variables to fetch. Empty means coordinates only.
    pub properties: Vec<String>,
    /// Exact-match feature identifier; bypasses time/space/pagination.
    pub feature_id: Option<String>,
    /// Vertical level filter. Accepted but not supported by any NWM
    /// dataset; supplying it is a not-implemented error.
    pub z: Option<String>,
    /// Page size over the feature dimension.
    pub limit: Option<usize>,
    /// Page start over the feature dimension.
    pub offset: usize,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    pub fn with_properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_feature_id(mut self, id: impl Into<String>) -> Self {
        self.feature_id = Some(id.into());
        self
    }

    pub fn with_z(mut self, z: impl Into<String>) -> Self {
        self.z = Some(z.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
