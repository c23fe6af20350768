// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use codec::QoS;
use fengbo::{AsyncClient, ConnectOptions};

#[tokio::main]
async fn main() -> Result<(), fengbo::Error> {
    std::env::set_var("RUST_LOG", "info");
    env_logger::init();

    let address = "127.0.0.1:1883";
    let options = ConnectOptions::new(address).unwrap();
    log::info!("options: {:?}", options);

    let mut client = AsyncClient::new(options);
    client.add_publish_listener("print", |result| match result {
        Ok(publish) => log::info!(
            "[{}] {:?}",
            publish.topic(),
            std::str::from_utf8(publish.message())
        ),
        Err(err) => log::error!("decode error: {err}"),
    });

    let ack = client.connect().await?;
    log::info!("connected, session present: {}", ack.session_present());

    let topics = vec![codec::SubscribeTopic::new("hello", QoS::AtMostOnce).unwrap()];
    let suback = client.subscribe(topics).await?;
    log::info!("subscribed: {:?}", suback.reasons());
    let _receipt = client.publish("hello", QoS::AtMostOnce, b"Hello, world").await?;

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    client.disconnect().await
}
