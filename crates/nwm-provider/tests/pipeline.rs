//! End-to-end pipeline tests over the in-memory dataset fixtures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nwm_provider::{
    BoundingBox, CoverageResponse, EdrQueries, FeatureQueries, NwmProvider, ProviderConfig,
    ProviderError, QueryParams,
};
use test_utils::{grid_dataset, vector_dataset, MemoryDataset};
use zarr_dataset::{BackendKind, DatasetCache, DatasetKey, StoreConfig};

fn vector_provider() -> NwmProvider<MemoryDataset> {
    let config = ProviderConfig::vector(
        StoreConfig::local("/data"),
        "chrtout.zarr",
        "time",
        "longitude",
        "latitude",
        "feature_id",
    );
    NwmProvider::with_source(config, Arc::new(vector_dataset())).unwrap()
}

#[test]
fn cube_response_shape_is_field_exact() {
    let provider = vector_provider();
    let params = QueryParams::new()
        .with_properties(["streamflow"])
        .with_datetime("2020-01-01T00:00:00Z/..")
        .with_feature_id("101");
    let CoverageResponse::Collection(collection) = provider.cube(&params).unwrap() else {
        panic!("expected a collection");
    };

    let json = serde_json::to_value(&collection).unwrap();
    assert_eq!(json["type"], "CoverageCollection");
    assert_eq!(
        json["parameters"]["streamflow"]["observedProperty"]["id"],
        "streamflow"
    );
    assert_eq!(
        json["parameters"]["streamflow"]["unit"]["symbol"],
        "m3 s-1"
    );
    assert_eq!(json["referencing"][0]["coordinates"][0], "y");
    assert_eq!(json["referencing"][1]["system"]["calendar"], "Gregorian");

    let coverage = &json["coverages"][0];
    assert_eq!(coverage["domain"]["domainType"], "PointSeries");
    assert_eq!(coverage["domain"]["axes"]["x"]["values"][0], -100.0);
    assert_eq!(
        coverage["ranges"]["streamflow"]["axisNames"],
        serde_json::json!(["t"])
    );
    assert_eq!(
        coverage["ranges"]["streamflow"]["shape"],
        serde_json::json!([3])
    );
    assert_eq!(
        coverage["ranges"]["streamflow"]["values"],
        serde_json::json!([0.0, 10.0, 20.0])
    );
}

#[test]
fn grid_cube_serializes_nan_as_null() {
    let config =
        ProviderConfig::raster(StoreConfig::local("/data"), "ldasout.zarr", "time", "x", "y");
    let provider = NwmProvider::with_source(config, Arc::new(grid_dataset())).unwrap();
    let params = QueryParams::new()
        .with_properties(["depth"])
        .with_datetime("2020-01-01T00:00:00Z")
        .with_bbox(BoundingBox::new(-109.5, 30.5, -107.5, 32.5).unwrap());

    let CoverageResponse::Grid(coverage) = provider.cube(&params).unwrap() else {
        panic!("expected a grid coverage");
    };
    let json = serde_json::to_string(&coverage).unwrap();
    assert!(json.contains("\"domainType\":\"Grid\""));
    assert!(json.contains("null"));
    assert!(!json.to_lowercase().contains("nan"));
}

#[test]
fn pagination_composes_with_filters_through_the_provider() {
    let provider = vector_provider();
    let base = QueryParams::new()
        .with_datetime("2020-01-01T00:00:00Z")
        .with_bbox(BoundingBox::new(-101.0, 30.0, -84.0, 36.0).unwrap());

    let all = provider
        .items(&base.clone().with_limit(3))
        .map(feature_ids)
        .unwrap();
    let page = provider
        .items(&base.clone().with_limit(2).with_offset(1))
        .map(feature_ids)
        .unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(&all[1..], page.as_slice());
}

fn feature_ids(response: covjson_protocol::FeatureResponse) -> Vec<String> {
    match response {
        covjson_protocol::FeatureResponse::Collection(c) => {
            c.features.into_iter().map(|f| f.id).collect()
        }
        covjson_protocol::FeatureResponse::Single(f) => vec![f.id],
    }
}

#[test]
fn reprojection_changes_output_coordinates() {
    let config = ProviderConfig::vector(
        StoreConfig::local("/data"),
        "chrtout.zarr",
        "time",
        "longitude",
        "latitude",
        "feature_id",
    )
    .with_output_epsg(3857);
    let provider = NwmProvider::with_source(config, Arc::new(vector_dataset())).unwrap();

    let params = QueryParams::new()
        .with_properties(["streamflow"])
        .with_feature_id("101");
    let CoverageResponse::Collection(collection) = provider.cube(&params).unwrap() else {
        panic!("expected a collection");
    };
    let json = serde_json::to_value(&collection).unwrap();
    let x = json["coverages"][0]["domain"]["axes"]["x"]["values"][0]
        .as_f64()
        .unwrap();
    // (-100, 35) in Web Mercator.
    assert!((x - -11_131_949.0).abs() < 10.0);
    assert_eq!(
        json["referencing"][0]["system"]["id"],
        "http://www.opengis.net/def/crs/EPSG/0/3857"
    );
}

#[test]
fn no_data_and_query_errors_keep_their_category() {
    let provider = vector_provider();

    let err = provider
        .locations(
            &QueryParams::new()
                .with_properties(["streamflow"])
                .with_datetime("1900-01-01"),
        )
        .unwrap_err();
    assert!(matches!(err, ProviderError::NoData(_)));

    let err = provider
        .locations(
            &QueryParams::new()
                .with_properties(["streamflow"])
                .with_datetime("2020-01-02/2020-01-01"),
        )
        .unwrap_err();
    assert!(matches!(err, ProviderError::Query(_)));
}

#[test]
fn handle_cache_opens_once_across_providers() {
    let cache: DatasetCache<MemoryDataset> = DatasetCache::new();
    let key = DatasetKey {
        backend: BackendKind::Local,
        locator: "/data".to_string(),
        bucket: String::new(),
        subpath: "chrtout.zarr".to_string(),
    };
    let opens = AtomicUsize::new(0);

    for _ in 0..2 {
        let source = cache
            .get_or_open(&key, || {
                opens.fetch_add(1, Ordering::SeqCst);
                Ok(vector_dataset())
            })
            .unwrap();
        let config = ProviderConfig::vector(
            StoreConfig::local("/data"),
            "chrtout.zarr",
            "time",
            "longitude",
            "latitude",
            "feature_id",
        );
        let provider = NwmProvider::with_source(config, source).unwrap();
        provider
            .locations(
                &QueryParams::new()
                    .with_properties(["streamflow"])
                    .with_datetime("2020-01-01T00:00:00Z"),
            )
            .unwrap();
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
}
