mod api;
mod config;
mod error;
mod form;
mod main_lib;
mod mirror_engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    main_lib::run().await
}

#[cfg(test)]
mod test_support;
