use config::Config;
use sea_orm_migration::prelude::*;
use std::env;

#[tokio::main]
async fn main() {
    // DATABASE_URL wins; otherwise reuse the server's config.yaml
    if env::var("DATABASE_URL").is_err() {
        let settings = Config::builder()
            .add_source(config::File::with_name("config.yaml").required(false))
            .add_source(config::Environment::default().separator("__"))
            .build()
            .expect("Failed to read configuration");
        match settings.get_string("database_url") {
            Ok(url) => env::set_var("DATABASE_URL", url),
            Err(_) => eprintln!("DATABASE_URL is not set and config.yaml has no database_url"),
        }
    }
    cli::run_cli(migration::Migrator).await;
}
