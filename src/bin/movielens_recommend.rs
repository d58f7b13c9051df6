//! Train a factorization model on an unpacked Movielens 100K directory
//! and print similar items and recommendations.
//!
//! Usage: `movielens_recommend [config.json]`. Log verbosity follows
//! `RUST_LOG`.
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;

use failure::format_err;
use serde_derive::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use embrec::data::{join, max_ids, train_test_split};
use embrec::datasets::load_movielens_100k;
use embrec::evaluation::{mae_score, prediction_pairs};
use embrec::models::factorization::Hyperparameters;
use embrec::models::{EpochLoss, Optimizer};
use embrec::similarity::{most_similar, recommend};
use embrec::{ItemId, UserId};

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct PipelineConfig {
    data_dir: PathBuf,
    embedding_dim: usize,
    learning_rate: f32,
    optimizer: Optimizer,
    minibatch_size: usize,
    num_epochs: usize,
    validation_fraction: f32,
    test_fraction: f32,
    seed: u64,
    query_item: ItemId,
    query_user: UserId,
    top_n: usize,
    model_path: Option<PathBuf>,
    embeddings_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: PathBuf::from("ml-100k"),
            embedding_dim: 64,
            learning_rate: 0.01,
            optimizer: Optimizer::Adam,
            minibatch_size: 64,
            num_epochs: 10,
            validation_fraction: 0.1,
            test_fraction: 0.2,
            seed: 0,
            query_item: 50,
            query_user: 5,
            top_n: 10,
            model_path: None,
            embeddings_path: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    history: Vec<EpochLoss>,
    test_mae: f32,
    predictions: Vec<(f32, f32)>,
}

fn load_config() -> Result<PipelineConfig, failure::Error> {
    match std::env::args().nth(1) {
        Some(path) => Ok(serde_json::from_reader(File::open(path)?)?),
        None => Ok(PipelineConfig::default()),
    }
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    info!(config = ?config, "starting");

    let (ratings, items) = load_movielens_100k(&config.data_dir)?;
    let rows = join(&ratings, &items);
    let titles: HashMap<ItemId, &str> = items
        .iter()
        .map(|item| (item.item_id(), item.title()))
        .collect();

    let (max_user_id, max_item_id) =
        max_ids(&rows).ok_or_else(|| format_err!("No ratings matched a known item."))?;
    let (train, test) = train_test_split(&rows, config.test_fraction, config.seed)?;

    info!(train = train.len(), test = test.len(), "split ratings");

    let mut model = Hyperparameters::new(max_user_id, max_item_id)
        .embedding_dim(config.embedding_dim)
        .learning_rate(config.learning_rate)
        .optimizer(config.optimizer)
        .minibatch_size(config.minibatch_size)
        .num_epochs(config.num_epochs)
        .validation_fraction(config.validation_fraction)
        .from_seed(config.seed)
        .build()?;

    let history = model.fit(&train)?;
    let report = Report {
        history,
        test_mae: mae_score(&model, &test)?,
        predictions: prediction_pairs(&model, &test)?,
    };

    info!(test_mae = report.test_mae, "evaluated model");

    let title = |item_id: ItemId| titles.get(&item_id).cloned().unwrap_or("?");

    println!("Items most similar to {}:", title(config.query_item));
    let neighbours = most_similar(config.query_item, model.item_embeddings(), config.top_n)?;
    for (item_id, similarity) in neighbours {
        println!("  {:>5} {:.3} {}", item_id, similarity, title(item_id));
    }

    println!("Recommendations for user {}:", config.query_user);
    let recommendations = recommend(&model, &rows, config.query_user, config.top_n)?;
    for (item_id, prediction) in recommendations {
        println!("  {:>5} {:.2} {}", item_id, prediction, title(item_id));
    }

    if let Some(ref path) = config.model_path {
        model.save(path)?;
    }

    if let Some(ref path) = config.embeddings_path {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;

        for (item_id, embedding) in model.item_embeddings().outer_iter().enumerate() {
            let mut record = vec![item_id.to_string()];
            record.extend(embedding.iter().map(|x| x.to_string()));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!(path = %path.display(), "exported item embeddings");
    }

    println!("{}", serde_json::to_string(&report)?);

    Ok(())
}
