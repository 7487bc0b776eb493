use crate::config::VigieConfig;
use rumqttc::{AsyncClient, MqttOptions};
use std::time::Duration;
use tokio::task;

/// Crée le client MQTT partagé du kernel et lance la task qui draine son
/// event loop. Retourne None si aucun broker n'est configuré.
pub fn create_mqtt_client(cfg: &VigieConfig) -> Option<AsyncClient> {
    let mqtt_cfg = cfg.mqtt.clone()?;

    let mut opts = MqttOptions::new("vigie-kernel", &mqtt_cfg.host, mqtt_cfg.port);
    opts.set_keep_alive(Duration::from_secs(15));
    let (client, mut eventloop) = AsyncClient::new(opts, 10);

    task::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(_) => {}
                Err(e) => {
                    eprintln!("[mqtt] erreur: {e:?}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    println!("[mqtt] client ready for {}:{}", mqtt_cfg.host, mqtt_cfg.port);
    Some(client)
}
