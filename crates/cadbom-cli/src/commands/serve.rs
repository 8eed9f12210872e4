use cadbom_core::Config;
use cadbom_http::HttpServerConfig;
use std::net::SocketAddr;

pub fn run(config: &Config, bind: Option<String>) {
    let bind = bind.unwrap_or_else(|| config.bind.clone());
    let bind: SocketAddr = bind.parse().unwrap_or_else(|e| {
        eprintln!("error: invalid bind address `{bind}`: {e}");
        std::process::exit(1);
    });

    let engine = config.open_engine();
    eprintln!(
        "cadbom serve\n  Listening: http://{bind}\n  Store: {}",
        config.store_dir.display()
    );
    cadbom_http::serve(&engine, &HttpServerConfig::new(bind)).unwrap_or_else(|e| {
        eprintln!("error: http server failed: {e}");
        std::process::exit(1);
    });
}
