//! End-to-end runs of the stage engines and the composed pipeline
//! against in-memory data and the fixtures in `testdata/`.

use anyhow::Result;
use tabprep::PipelineError;
use tabprep::dataset::{
    TabularDataset, categorical_series, complete_values, dense_series, numeric_series,
};
use tabprep::pipeline::{Pipeline, PipelineConfig};
use tabprep::stages::{
    DataSplitter, DecisionTreeStrategy, DropStrategy, FeatureEngineer, FeatureSpec, FillStrategy,
    Iqr, LogTransform, MeanBaselineStrategy, MissingValueHandler, ModelBuilder, OneHotEncode,
    OutlierHandling, SimpleSplit, Stage, ZScore,
};

fn houses() -> Result<TabularDataset> {
    Ok(TabularDataset::new(vec![
        numeric_series(
            "area",
            [
                Some(120.0),
                Some(85.0),
                None,
                Some(140.0),
                Some(95.0),
                Some(110.0),
                Some(150.0),
                Some(70.0),
                Some(130.0),
                Some(100.0),
            ],
        ),
        categorical_series(
            "city",
            [
                Some("Ames"),
                Some("Boone"),
                Some("Ames"),
                Some("Nevada"),
                Some("Boone"),
                Some("Ames"),
                Some("Nevada"),
                Some("Boone"),
                Some("Nevada"),
                Some("Ames"),
            ],
        ),
        dense_series(
            "price",
            [210.0, 150.0, 205.0, 260.0, 165.0, 198.0, 275.0, 120.0, 230.0, 180.0],
        ),
    ])?)
}

#[test]
fn test_fill_onehot_split_baseline() -> Result<()> {
    let dataset = houses()?;
    let rows = dataset.n_rows();

    let filled = MissingValueHandler::new(FillStrategy::mean())
        .execute(dataset)?
        .output;
    assert_eq!(filled.missing_count(), 0);

    let encoded = FeatureEngineer::new(OneHotEncode)
        .execute(filled, &FeatureSpec::new(["city"]))?
        .output;
    assert!(!encoded.contains("city"));
    assert!(encoded.contains("city_Boone"));
    assert!(encoded.contains("city_Nevada"));

    let split = DataSplitter::new(SimpleSplit::new(0.2, 42)?)
        .execute(encoded, "price")?
        .output;
    let expected_test = (0.2 * rows as f64).round() as usize;
    assert_eq!(split.test_len(), expected_test);
    assert_eq!(split.train_len() + split.test_len(), rows);

    let model = ModelBuilder::new(MeanBaselineStrategy)
        .execute(&split.train_features, &split.train_target)?
        .output;
    let train_prices = complete_values(&split.train_target)?;
    let train_mean = train_prices.iter().sum::<f64>() / train_prices.len() as f64;

    let predictions = model.predict(&split.test_features)?;
    assert_eq!(predictions.len(), split.test_len());
    assert!(predictions.iter().all(|p| (p - train_mean).abs() < 1e-9));
    Ok(())
}

#[test]
fn test_pipeline_run_is_reproducible() -> Result<()> {
    let build = || {
        Pipeline::builder()
            .missing(FillStrategy::median())
            .features(OneHotEncode, FeatureSpec::new(["city"]))
            .outliers(ZScore::robust(3.0), OutlierHandling::Remove)
            .split(SimpleSplit::default())
            .model(MeanBaselineStrategy)
            .build()
    };
    let first = build()?.run(houses()?, "price")?;
    let second = build()?.run(houses()?, "price")?;
    assert_eq!(first.split, second.split);
    assert_eq!(first.report.stages.len(), 5);
    assert_eq!(first.report.stages[0].stage, Stage::MissingValues);
    assert_eq!(first.report.warning_count(), 0);
    Ok(())
}

#[test]
fn test_config_pipeline_on_fixture() -> Result<()> {
    let config = PipelineConfig::from_file("testdata/pipeline.json")?;
    let pipeline = config.build()?;
    let dataset = tabprep::io::load_dataset("testdata/houses.csv")?;
    assert_eq!(dataset.n_rows(), 20);
    assert_eq!(dataset.missing_count(), 2);

    let run = pipeline.run(dataset, &config.target)?;

    // The 2000 m² row is the only robust z-score outlier in `area`.
    let outliers = &run.report.stages[2];
    assert_eq!(outliers.stage, Stage::Outliers);
    assert_eq!(outliers.rows_after, 19);

    assert_eq!(run.report.test_rows, 4);
    assert_eq!(run.report.train_rows, 15);
    // area, rooms, garage, city_Boone, city_Nevada
    assert_eq!(run.model.feature_names().len(), 5);

    let scores = run.evaluate()?;
    assert_eq!(scores.rows, 4);
    assert!(scores.mse.is_finite());
    Ok(())
}

#[test]
fn test_strategy_swap_between_runs() -> Result<()> {
    let mut pipeline = Pipeline::builder()
        .missing(FillStrategy::mean())
        .features(OneHotEncode, FeatureSpec::new(["city"]))
        .outliers(ZScore::robust(3.0), OutlierHandling::Cap)
        .split(SimpleSplit::new(0.3, 7)?)
        .model(MeanBaselineStrategy)
        .build()?;
    let before = pipeline.run(houses()?, "price")?;

    pipeline.splitter_mut().set_strategy(SimpleSplit::new(0.5, 7)?);
    let after = pipeline.run(houses()?, "price")?;

    assert_eq!(before.report.test_rows, 3);
    assert_eq!(after.report.test_rows, 5);
    Ok(())
}

#[test]
fn test_inspect_fixture() -> Result<()> {
    let dataset = tabprep::io::load_dataset("testdata/houses.csv")?;
    let summaries = tabprep::inspect::summarise(&dataset)?;
    assert_eq!(summaries.len(), 5);

    let area = &summaries[0];
    assert_eq!(area.name, "area");
    assert_eq!(area.nulls, 2);
    assert!((area.null_pct() - 10.0).abs() < 1e-9);

    let city = summaries
        .iter()
        .find(|s| s.name == "city")
        .ok_or_else(|| anyhow::anyhow!("city column missing from summary"))?;
    assert_eq!(
        city.stats,
        tabprep::inspect::ColumnStats::Categorical(tabprep::inspect::CategoricalStats {
            distinct: 3,
            top: Some(("Ames".to_owned(), 8)),
        })
    );
    Ok(())
}

#[test]
fn test_pipeline_that_drops_every_row_fails_cleanly() -> Result<()> {
    let gappy = TabularDataset::new(vec![
        numeric_series("area", [Some(120.0), None, Some(95.0)]),
        numeric_series("price", [None, Some(150.0), None]),
    ])?;
    let pipeline = Pipeline::builder()
        .missing(DropStrategy::rows())
        .features(LogTransform, FeatureSpec::new(["area"]))
        .outliers(Iqr::default(), OutlierHandling::Remove)
        .split(SimpleSplit::default())
        .model(DecisionTreeStrategy::default())
        .build()?;

    let err = pipeline
        .run(gappy, "price")
        .err()
        .ok_or_else(|| anyhow::anyhow!("run on an emptied dataset succeeded"))?;
    assert!(matches!(err, PipelineError::Model(_)), "{err}");
    Ok(())
}
