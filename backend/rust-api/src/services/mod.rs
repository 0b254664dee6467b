use std::sync::Arc;

use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::stores::mongo::{MongoQuestionStore, MongoStudentStatsStore, MongoSubmissionStore};
use crate::stores::redis_cache::RedisResponseCache;
use crate::stores::{QuestionStore, ResponseCache, StudentStatsStore, SubmissionStore};

pub mod assembler;
pub mod generator;
pub mod grading;
pub mod pool_selector;
pub mod stats;

use assembler::QuizAssembler;
use generator::GeminiGenerator;
use grading::GradingEngine;
use stats::StatsAggregator;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self {
            config,
            mongo,
            redis,
        })
    }

    pub fn question_store(&self) -> Arc<dyn QuestionStore> {
        Arc::new(MongoQuestionStore::new(self.mongo.clone()))
    }

    pub fn submission_store(&self) -> Arc<dyn SubmissionStore> {
        Arc::new(MongoSubmissionStore::new(self.mongo.clone()))
    }

    pub fn stats_store(&self) -> Arc<dyn StudentStatsStore> {
        Arc::new(MongoStudentStatsStore::new(self.mongo.clone()))
    }

    pub fn response_cache(&self) -> Arc<dyn ResponseCache> {
        Arc::new(RedisResponseCache::new(self.redis.clone()))
    }

    pub fn quiz_assembler(&self) -> QuizAssembler {
        let generator = Arc::new(GeminiGenerator::new(
            self.config.generator_api_url.clone(),
            self.config.generator_api_key.clone(),
        ));
        QuizAssembler::new(self.question_store(), generator)
    }

    pub fn stats_aggregator(&self) -> Arc<StatsAggregator> {
        Arc::new(StatsAggregator::new(
            self.submission_store(),
            self.stats_store(),
            self.question_store(),
        ))
    }

    pub fn grading_engine(&self) -> GradingEngine {
        GradingEngine::new(
            self.question_store(),
            self.submission_store(),
            self.stats_aggregator(),
            self.response_cache(),
        )
    }
}
