//! procbus-core
//!
//! Core building blocks for a process supervisor driven over a
//! publish/subscribe bus.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（definition, stream, topic, state, errors）
//! - **ports**: 抽象化レイヤー（`BusClient`, `ProcessSpawner`）
//! - **app**: アプリケーションロジック（builder, runtime, router, supervisor, aggregator, publisher, cleaner）
//! - **impls**: 実装（TokioProcessSpawner と、テスト・開発用の in-memory 実装）

pub mod domain;
pub mod ports;
pub mod app;
pub mod impls;
