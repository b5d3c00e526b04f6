//! `kubecast doctor`: check that the relay can reach the cluster

use crate::server::config::AppConfig;
use crate::server::{connect_source, load_config};
use kubecast_core::EventSource;
use kubecast_kube::ClusterCredentials;

pub async fn run() -> anyhow::Result<()> {
    println!("🏥 kubecast doctor\n");

    let Some(config) = check_config() else {
        return fail();
    };

    let mut all_ok = check_credentials(&config);
    if all_ok {
        all_ok &= check_event_watch(&config).await;
    }

    println!();
    if all_ok {
        println!("✅ All checks passed. Ready to relay events.");
        Ok(())
    } else {
        fail()
    }
}

fn fail() -> anyhow::Result<()> {
    println!("⚠️  Some checks failed. Please fix the issues above.");
    std::process::exit(1);
}

fn check_config() -> Option<AppConfig> {
    print!("Checking configuration... ");
    match load_config() {
        Ok(config) => {
            println!("✅ OK");
            println!(
                "  listen {}:{}{}, queue {} ({})",
                config.server.host,
                config.server.port,
                config.server.path,
                config.hub.queue_capacity,
                config.hub.overflow_policy
            );
            Some(config)
        }
        Err(e) => {
            println!("❌ {e:#}");
            None
        }
    }
}

fn check_credentials(config: &AppConfig) -> bool {
    print!("Checking cluster credentials... ");
    match ClusterCredentials::load(&config.credential_options()) {
        Ok(credentials) => {
            println!("✅ {}", credentials.origin);
            println!("  API server: {}", credentials.server);
            true
        }
        Err(e) => {
            println!("❌ {e}");
            false
        }
    }
}

async fn check_event_watch(config: &AppConfig) -> bool {
    print!("Checking event access... ");
    let source = match connect_source(config) {
        Ok(source) => source,
        Err(e) => {
            println!("❌ {e:#}");
            return false;
        }
    };
    match source.current_version().await {
        Ok(version) => {
            println!("✅ events readable (resourceVersion {version})");
            true
        }
        Err(e) => {
            println!("❌ {e}");
            false
        }
    }
}
