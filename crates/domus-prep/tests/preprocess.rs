//! Integration tests: JSON listings -> fitted encoder -> feature matrix.

use domus_io::ListingReader;
use domus_prep::{OutlierRule, PrepConfig, PrepError, TargetMode, schema};
use serde_json::json;
use std::path::Path;

fn parse(value: &serde_json::Value) -> domus_io::ListingTable {
    ListingReader::new(Path::new("inline.json"))
        .parse(&value.to_string())
        .expect("inline listings should parse")
}

fn training_listings() -> serde_json::Value {
    let kitchens = ["installed", "semi equipped", "hyper equipped", "usa installed"];
    let states = ["good", "as new", "to renovate", "just renovated"];
    let records: Vec<serde_json::Value> = (0..40)
        .map(|i| {
            json!({
                "Url": format!("https://example.test/{i}"),
                "PropertyId": 7000 + i,
                "Price": 150_000 + 2_500 * i,
                "LivingArea": 60 + 3 * i,
                "PostalCode": ([1000, 2000, 3000, 4000][i % 4]),
                "ConstructionYear": if i % 5 == 0 { serde_json::Value::Null } else { json!(1950 + i) },
                "Kitchen": kitchens[i % 4],
                "Heating": if i % 7 == 0 { serde_json::Value::Null } else { json!("gas") },
                "StateOfBuilding": states[i % 4],
                "SubtypeOfProperty": "house",
                "TypeOfProperty": 1 + (i % 2),
                "TypeOfSale": 1,
                "Terrace": i % 2 == 0,
                "SurfaceOfGood": if i % 2 == 1 { serde_json::Value::Null } else { json!(400) },
            })
        })
        .collect();
    serde_json::Value::Array(records)
}

#[test]
fn fit_then_transform_unlabelled_listings() {
    let table = parse(&training_listings());
    let prepared = PrepConfig::new().fit(&table).unwrap();

    assert_eq!(prepared.report.n_input, 40);
    assert_eq!(prepared.features.n_rows(), 40);
    assert!(prepared.features.rows().iter().flatten().all(|x| x.is_finite()));

    let fresh = parse(&json!([
        {"PropertyId": 9001, "LivingArea": 110, "PostalCode": 2000, "Kitchen": "installed", "Heating": "gas"},
        {"PropertyId": 9002, "LivingArea": null, "PostalCode": 9999, "Kitchen": "unknown model"}
    ]));
    let matrix = prepared.encoder.transform(&fresh, TargetMode::Absent).unwrap();

    assert_eq!(matrix.feature_names(), prepared.features.feature_names());
    assert_eq!(matrix.row_ids(), &["9001", "9002"]);

    let col = |name: &str| {
        matrix
            .feature_names()
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("no feature {name}"))
    };
    let rows = matrix.rows();
    assert_eq!(rows[0][col(schema::KITCHEN)], 5.0);
    assert_eq!(rows[1][col(schema::KITCHEN)], -1.0);
    assert_eq!(rows[0][col(schema::LIVING_AREA_CATEGORY)], 3.0);
    assert_eq!(rows[1][col(schema::LIVING_AREA_CATEGORY)], -1.0);
    // Unseen postal code falls back to the overall mean price.
    let mean_price = prepared.features.targets().unwrap().iter().sum::<f64>() / 40.0;
    assert!((rows[1][col(schema::PRICE_MEAN_BY_POSTAL)] - mean_price).abs() < 1e-6);
}

#[test]
fn z_score_rule_drops_extreme_listing() {
    let mut value = training_listings();
    value.as_array_mut().unwrap()[3]["Price"] = json!(90_000_000);
    let table = parse(&value);

    let prepared = PrepConfig::new()
        .with_outlier_rule(OutlierRule::z_score())
        .fit(&table)
        .unwrap();
    assert_eq!(prepared.report.outliers, 1);
    assert!(!prepared.features.row_ids().iter().any(|id| id == "7003"));
}

#[test]
fn encoder_file_round_trip() {
    let table = parse(&training_listings());
    let prepared = PrepConfig::new().fit(&table).unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("domus_encoder.bin");

    prepared.encoder.save(&path).unwrap();
    let loaded = domus_prep::FittedEncoder::load(&path).unwrap();
    let matrix = loaded.transform(&table, TargetMode::Required).unwrap();
    assert_eq!(matrix.rows(), prepared.features.rows());
}

#[test]
fn labelled_transform_requires_price() {
    let table = parse(&training_listings());
    let prepared = PrepConfig::new().fit(&table).unwrap();
    let unlabelled = parse(&json!([{"PostalCode": 1000}]));
    let result = prepared.encoder.transform(&unlabelled, TargetMode::Required);
    assert!(matches!(result, Err(PrepError::Table(_))));
}

#[test]
fn held_out_rows_never_see_their_own_price() {
    // Every listing sits in its own postal code.
    let records: Vec<serde_json::Value> = (0..50)
        .map(|i| {
            json!({
                "PropertyId": 100 + i,
                "Price": 100_000 + 10_000 * i,
                "LivingArea": 70 + i,
                "PostalCode": 1000 + i,
            })
        })
        .collect();
    let table = parse(&serde_json::Value::Array(records));
    let config = PrepConfig::new().with_outlier_rule(OutlierRule::None);
    let scoped = config.scope(&table).unwrap();

    let train_idx: Vec<usize> = (0..50).filter(|i| i % 10 != 3).collect();
    let test_idx: Vec<usize> = (0..50).filter(|i| i % 10 == 3).collect();
    let prepared = config.fit_scoped(&scoped.select_rows(&train_idx)).unwrap();
    let held_out = prepared
        .encoder
        .transform(scoped.select_rows(&test_idx).table(), TargetMode::Required)
        .unwrap();

    let j = held_out
        .feature_names()
        .iter()
        .position(|n| n == schema::PRICE_MEAN_BY_POSTAL)
        .unwrap();
    let train_targets = prepared.features.targets().unwrap();
    let train_mean = train_targets.iter().sum::<f64>() / train_targets.len() as f64;
    let own_prices = held_out.targets().unwrap();

    assert_eq!(held_out.row_ids(), &["103", "113", "123", "133", "143"]);
    for (row, own) in held_out.rows().iter().zip(own_prices) {
        assert!((row[j] - train_mean).abs() < 1e-6, "got {}, want {train_mean}", row[j]);
        assert_ne!(row[j], *own);
    }
}

#[test]
fn held_out_postal_code_uses_training_mean() {
    let mut value = training_listings();
    let records = value.as_array_mut().unwrap();
    records[0]["PostalCode"] = json!(9300);
    records[0]["Price"] = json!(5_000_000);
    let table = parse(&value);
    let config = PrepConfig::new().with_outlier_rule(OutlierRule::None);
    let scoped = config.scope(&table).unwrap();

    let prepared = config.fit_scoped(&scoped.select_rows(&(1..40).collect::<Vec<_>>())).unwrap();
    let held_out = prepared
        .encoder
        .transform(scoped.select_rows(&[0]).table(), TargetMode::Required)
        .unwrap();

    let j = held_out
        .feature_names()
        .iter()
        .position(|n| n == schema::PRICE_MEAN_BY_POSTAL)
        .unwrap();
    let train_targets = prepared.features.targets().unwrap();
    let train_mean = train_targets.iter().sum::<f64>() / train_targets.len() as f64;
    assert!((held_out.rows()[0][j] - train_mean).abs() < 1e-6);
    assert!(held_out.rows()[0][j] < 1_000_000.0);
}
