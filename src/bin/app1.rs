//! Lab upstream "app1": every request gets `Hello from app1 on 3000`.

use stub_origin::{logging, Server, ServerConfig};

fn main() -> anyhow::Result<()> {
    logging::init();

    match Server::listen(ServerConfig::app1())? {}
}
