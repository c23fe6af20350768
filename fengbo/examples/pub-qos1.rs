// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use codec::QoS;
use fengbo::{AsyncClient, ConnectOptions};

#[tokio::main]
async fn main() -> Result<(), fengbo::Error> {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let options = ConnectOptions::new("127.0.0.1:1883").unwrap();
    let mut client = AsyncClient::new(options);
    client.connect().await?;

    let receipt = client
        .publish("hello", QoS::AtLeastOnce, b"Hello, world")
        .await?;
    log::info!("publish acknowledged: {receipt:?}");

    client.disconnect().await
}
