//! Cross-tab store demo
//!
//! Opens two tabs on one origin, binds a counter store and a preferences
//! multi-store in each, and shows writes in one tab reaching the other.
//!
//! Usage:
//!   cargo run --bin cross_tab_demo
//!
//! Optional environment variables:
//!   SYNCSTORE_CONFIG_PATH - YAML config (default config/syncstore.yaml)
//!   SYNCSTORE_LOG_LEVEL   - log level override

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use synced_hooks::bin_common::{
    init_logging_with_level, load_sync_config, BinaryRunner, ConfigType, RunConfig,
};
use synced_hooks::syncstore::{
    optional, store, with_default, MultiStore, Origin, Store, Subscription, SyncConfig, Tab,
};
use tracing::info;

struct TabView {
    label: &'static str,
    _tab: Tab,
    counter: Store<i64>,
    prefs: MultiStore,
    seen: Arc<Mutex<Vec<i64>>>,
    _subscription: Subscription,
}

impl TabView {
    fn open(label: &'static str, origin: &Origin, config: &SyncConfig) -> Self {
        let tab = origin.open_tab();
        let local = Arc::new(tab.local());

        let counter = store::<i64>()
            .key("counter")
            .validator(with_default(0))
            .broadcast(config.broadcast_channel(local.clone()))
            .build(local.clone());

        let prefs = MultiStore::builder()
            .entry::<String, _>("theme", with_default("light".to_string()))
            .entry::<Option<String>, _>("locale", optional::<String>())
            .broadcast(config.broadcast_channel(local.clone()))
            .build(local);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = counter.subscribe(move |value| sink.lock().push(*value));

        Self {
            label,
            _tab: tab,
            counter,
            prefs,
            seen,
            _subscription: subscription,
        }
    }

    fn report(&self) -> Result<()> {
        info!(
            "[{}] counter={} theme={} locale={} notifications={:?}",
            self.label,
            self.counter.get()?,
            self.prefs.get("theme")?,
            self.prefs.get("locale")?,
            self.seen.lock()
        );
        Ok(())
    }
}

struct CrossTabDemo {
    config: RunConfig,
    _origin: Origin,
    left: TabView,
    right: TabView,
}

impl BinaryRunner for CrossTabDemo {
    async fn step(&mut self, index: u32) -> Result<()> {
        let (writer, reader) = if index % 2 == 0 {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        };

        let next = writer.counter.update(|n| n + 1)?;
        info!("[{}] incremented counter to {}", writer.label, next);

        if index == 1 {
            writer.prefs.set("theme", "dark")?;
            writer.prefs.set("locale", json!("en-GB"))?;
            info!("[{}] switched theme and locale", writer.label);
        }

        writer.report()?;
        reader.report()?;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.config
    }

    fn summary(&self) -> Option<String> {
        Some(format!(
            "left saw {:?}, right saw {:?}",
            self.left.seen.lock(),
            self.right.seen.lock()
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_sync_config(ConfigType::Sync)?;
    init_logging_with_level(&config.log_level);
    config.log();

    let origin = Origin::new("https://demo.local");
    let left = TabView::open("left", &origin, &config);
    let right = TabView::open("right", &origin, &config);
    info!("Opened {} tabs on {}", origin.tab_count(), origin.name());

    if let Some(file) = config.file_storage()? {
        info!("Durable storage at {:?}", file.path());
    }

    let mut demo = CrossTabDemo {
        config: RunConfig::new("cross_tab_demo").with_steps(4),
        _origin: origin,
        left,
        right,
    };
    demo.execute().await
}
