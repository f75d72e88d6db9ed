use dotenvy::dotenv;
use firebridge_core::CommandRecord;
use firebridge_firebase::{FirebaseConfig, FirebaseStore, StateStore};
use tokio::time::{sleep, timeout, Duration};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let command = std::env::args().nth(1).unwrap_or_else(|| "temp".to_string());
    let config = FirebaseConfig::from_env();
    eprintln!("Using database {}", config.database_url);

    let store = match FirebaseStore::new(config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Client setup failed: {}", e);
            std::process::exit(2);
        }
    };

    let before = match store.get_response().await {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Store unreachable: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = store.set_command(&CommandRecord::new(command.clone())).await {
        eprintln!("Failed to publish command: {}", e);
        std::process::exit(3);
    }
    eprintln!("Published command '{}', waiting for the bridge", command);

    // Wait up to 10s for the response record to change, then print and exit
    let waited = timeout(Duration::from_secs(10), async {
        loop {
            sleep(Duration::from_millis(500)).await;
            if let Ok(record) = store.get_response().await {
                if record != before {
                    return record;
                }
            }
        }
    })
    .await;

    match waited {
        Ok(record) => {
            for (key, value) in [("temp", &record.temp), ("led", &record.led), ("error", &record.error)] {
                if let Some(v) = value {
                    println!("{}: {}", key, v);
                }
            }
        }
        Err(_) => {
            eprintln!("Timeout waiting for a response update (an unchanged command is not re-dispatched)");
            std::process::exit(4);
        }
    }
}
