//! Shared test harness: a tempdir-backed depot and a deterministic
//! embedding gateway so no external model service is needed.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use depot::app::Depot;
use depot::config::Config;
use depot::embedding::{l2_normalize, EmbeddingGateway};
use depot::error::Result;

/// Deterministic gateway: texts embed into a fixed-dimension vector from
/// token buckets, with two pinned concept dimensions so related texts
/// land close together and unrelated ones far apart.
pub struct HashGateway {
    dims: usize,
}

const ML_WORDS: [&str; 9] = [
    "neural", "network", "networks", "training", "deep", "learning", "model", "accuracy",
    "gradient",
];
const BAKING_WORDS: [&str; 8] = [
    "baking", "sourdough", "bread", "oven", "dough", "flour", "crust", "starter",
];

impl HashGateway {
    pub fn new(dims: usize) -> HashGateway {
        assert!(dims >= 4);
        HashGateway { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let dim = if ML_WORDS.contains(&token.as_str()) {
                0
            } else if BAKING_WORDS.contains(&token.as_str()) {
                1
            } else {
                let mut h: usize = 17;
                for b in token.bytes() {
                    h = h.wrapping_mul(31).wrapping_add(b as usize);
                }
                2 + (h % (self.dims - 2))
            };
            v[dim] += 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingGateway for HashGateway {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// A depot over a fresh tempdir with one tenant created.
pub struct TestDepot {
    pub depot: Arc<Depot>,
    pub tenant: String,
    _tmp: TempDir,
}

pub const TEST_QUOTA: i64 = 1_000_000;

pub async fn setup() -> TestDepot {
    setup_with_quota(TEST_QUOTA).await
}

pub async fn setup_with_quota(quota: i64) -> TestDepot {
    let tmp = TempDir::new().expect("tempdir");
    let config = Config::minimal(tmp.path());
    let depot = Depot::open_with_gateway(config, Box::new(HashGateway::new(8)))
        .await
        .expect("open depot");

    let tenant = "acme".to_string();
    depot
        .guard
        .create_tenant(&tenant, quota)
        .await
        .expect("create tenant");

    TestDepot {
        depot: Arc::new(depot),
        tenant,
        _tmp: tmp,
    }
}

/// Encode a tiny solid-color PNG for thumbnail tests.
pub fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    use image::{ImageFormat, Rgb, RgbImage};
    let img = RgbImage::from_pixel(width, height, Rgb([120, 90, 60]));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

pub fn storage_root(t: &TestDepot) -> &Path {
    &t.depot.config.storage.root
}
