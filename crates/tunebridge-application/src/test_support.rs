// SPDX-License-Identifier: GPL-3.0-or-later

//! Helpers shared by the download and media cache test suites.

use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a server whose GET responses declare `declared` bytes but send only
/// `body` before the connection drops. HEAD requests get the headers alone.
/// Returns the base URL; every path is answered the same way.
pub(crate) async fn truncated_body_server(body: &'static [u8], declared: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let read = socket.read(&mut request).await.unwrap_or(0);
                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: audio/flac\r\ncontent-length: {declared}\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                if !request[..read].starts_with(b"HEAD") {
                    let _ = socket.write_all(body).await;
                }
                let _ = socket.flush().await;
            });
        }
    });

    format!("http://{addr}")
}

/// Names of in-flight `.part` files directly under `dir`.
pub(crate) fn temp_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with(".part"))
                .collect()
        })
        .unwrap_or_default()
}
