use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use zune_jpeg::{JpegDecoder, zune_core::bytestream::ZCursor};

// Matches the publisher's raised packet ceiling; the 10 KiB default
// would reject every full frame.
const MAX_PACKET_SIZE: usize = 1024 * 1024;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = match args.next() {
        Some(text) => text.parse().context("port must be a number")?,
        None => 1883,
    };
    let topic = args.next().unwrap_or_else(|| "webcam/stream".to_string());
    let save_dir = args.next().map(PathBuf::from);

    if let Some(dir) = &save_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut options = MqttOptions::new(
        format!("stream-viewer-{}", std::process::id()),
        host.clone(),
        port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

    let (client, mut connection) = Client::new(options, 10);
    client.subscribe(&topic, QoS::AtMostOnce)?;

    println!("watching {topic} on {host}:{port}");

    let mut count = 0usize;
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                count += 1;
                match inspect_payload(&publish.payload) {
                    Ok(frame) => {
                        println!(
                            "frame {count}: {}x{} {}KB ({})",
                            frame.width,
                            frame.height,
                            frame.jpeg.len().div_ceil(1024),
                            frame.encoding
                        );
                        if let Some(dir) = &save_dir {
                            let path = dir.join(format!("frame_{count:05}.jpg"));
                            fs::write(&path, &frame.jpeg)
                                .with_context(|| format!("failed to write {}", path.display()))?;
                        }
                    }
                    Err(err) => println!("frame {count}: undecodable payload ({err})"),
                }
            }
            Ok(_) => {}
            Err(err) => return Err(anyhow!("connection error: {err}")),
        }
    }

    Ok(())
}

struct ViewedFrame {
    jpeg: Vec<u8>,
    width: usize,
    height: usize,
    encoding: &'static str,
}

/// The publisher sends either raw JPEG bytes or the same bytes as
/// base64 text; the JPEG start-of-image marker tells them apart.
fn inspect_payload(payload: &[u8]) -> Result<ViewedFrame> {
    let (jpeg, encoding) = if payload.starts_with(&[0xFF, 0xD8]) {
        (payload.to_vec(), "binary")
    } else {
        (
            BASE64
                .decode(payload)
                .context("payload is neither JPEG nor base64")?,
            "base64",
        )
    };

    let mut decoder = JpegDecoder::new(ZCursor::new(jpeg.as_slice()));
    decoder
        .decode_headers()
        .map_err(|err| anyhow!("invalid JPEG: {err:?}"))?;
    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("missing JPEG header info"))?;

    Ok(ViewedFrame {
        width: info.width as usize,
        height: info.height as usize,
        jpeg,
        encoding,
    })
}
