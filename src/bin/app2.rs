//! Lab upstream "app2": every request gets `Hello from app2 on 4000`.

use stub_origin::{logging, Server, ServerConfig};

fn main() -> anyhow::Result<()> {
    logging::init();

    match Server::listen(ServerConfig::app2())? {}
}
