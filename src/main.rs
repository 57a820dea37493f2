use dotenvy::dotenv;
use lms_backend::config::{database, settings};
use lms_backend::core::users;
use lms_backend::errors::Result;
use lms_backend::web::{self, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load configuration (file, then environment overrides)
    let app_config = settings::load_app_config()
        .inspect_err(|e| error!("Critical error loading application configuration: {}", e))?;
    info!("Successfully processed application configuration.");

    // 4. Initialize database: schema and roles
    let db = database::init_database(&app_config.database.url)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. Seed the first Super Admin (if configured)
    if let Some(seed) = &app_config.seed_admin {
        users::ensure_seed_admin(&db, &app_config.auth, seed)
            .await
            .inspect_err(|e| error!("Failed to seed admin account: {}", e))?;
    }

    // 6. Serve until Ctrl-C
    web::serve(AppState::new(db, app_config)).await
}
