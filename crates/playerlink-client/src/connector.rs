use crate::client::{Client, ClientConfig};
use crate::error::Result;

/// Connect to a Player server with default configuration.
pub fn connect(host: &str, port: u16) -> Result<Client> {
    connect_with_config(host, port, ClientConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(host: &str, port: u16, config: ClientConfig) -> Result<Client> {
    let mut client = Client::with_config(config);
    client.connect(host, port)?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use crate::error::ClientError;
    use crate::handshake::HandshakeConfig;

    #[test]
    fn connect_convenience() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut banner = b"Player v.2.0".to_vec();
            banner.resize(32, 0);
            stream.write_all(&banner).unwrap();
            // Hold the socket open until the client hangs up.
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
        });

        let config = ClientConfig {
            handshake: HandshakeConfig {
                initial_mode: None,
                ..HandshakeConfig::default()
            },
            ..ClientConfig::default()
        };
        let mut client = connect_with_config("127.0.0.1", port, config).unwrap();
        assert!(client.is_connected());
        assert_eq!(client.banner().unwrap().text(), "Player v.2.0");
        assert_eq!(client.transport().unwrap().peer_addr().port(), port);

        client.disconnect().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect("127.0.0.1", port).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
