//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **AppBuilder**: ワイヤリングと起動時検証
//! - **Runtime**: 単一イベントループ（bus events, child events, shutdown）
//! - **CommandRouter**: 受信 topic から supervisor 操作へ
//! - **ProcessSupervisor**: process ごとのライフサイクル、spawn キュー、stdin、signal
//! - **OutputAggregator**: handler mode と上限付き出力バッファ
//! - **StatusPublisher**: ライフサイクルと出力を status topic へ
//! - **RetainedTopicCleaner**: 接続直後の古い retained 出力の掃除

pub mod aggregator;
pub mod builder;
pub mod cleaner;
pub mod config;
pub mod publisher;
pub mod router;
pub mod runtime;
pub mod status;
pub mod supervisor;

// 主要な型を再エクスポート
pub use self::aggregator::{Delivery, OutputAggregator, OutputBuffer};
pub use self::builder::{AppBuilder, BuildError};
pub use self::cleaner::RetainedTopicCleaner;
pub use self::config::SupervisorConfig;
pub use self::publisher::StatusPublisher;
pub use self::router::{CommandRouter, Routed};
pub use self::runtime::Runtime;
pub use self::status::{ProcessStatus, StatusSnapshot};
pub use self::supervisor::{PipeOutcome, ProcessSupervisor, SpawnOutcome};
