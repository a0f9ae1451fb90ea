//! Interactive line client
//!
//! Forwards input lines to the server and prints every response line. The
//! session ends when the server closes the connection; closing the input
//! half-closes the socket so outstanding responses still arrive.

use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::RtdocResult;

/// Connect to a server and run a session on stdin and stdout
pub async fn run(host: &str, port: u16) -> RtdocResult<()> {
    let stream = TcpStream::connect((host, port)).await?;
    info!("Connected to {}", stream.peer_addr()?);

    run_session(stream, BufReader::new(io::stdin()), io::stdout()).await
}

/// Pump lines between `input`, the server connection and `output`
pub async fn run_session<S, I, O>(stream: S, input: I, mut output: O) -> RtdocResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (reader, mut writer) = io::split(stream);
    let mut responses = BufReader::new(reader).lines();
    let mut requests = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            request = requests.next_line(), if input_open => match request? {
                Some(line) => {
                    writer.write_all(line.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                None => {
                    debug!("Input closed");
                    input_open = false;
                    writer.shutdown().await?;
                }
            },
            response = responses.next_line() => match response? {
                Some(line) => {
                    output.write_all(line.as_bytes()).await?;
                    output.write_all(b"\n").await?;
                    output.flush().await?;
                }
                None => break,
            },
        }
    }

    info!("Server closed the connection");
    Ok(())
}
