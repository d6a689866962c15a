// src/relay/ftp.rs
//
// Minimal FTP client: just enough of RFC 959 to log in, walk/create a
// directory chain and STOR one file over a passive data connection.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_FTP_PORT: u16 = 21;

#[derive(Debug, Error)]
pub enum FtpError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },
    #[error("login rejected: {code} {message}")]
    Login { code: u16, message: String },
    #[error("{command} rejected: {code} {message}")]
    Rejected {
        command: String,
        code: u16,
        message: String,
    },
    #[error("malformed reply: {0}")]
    Malformed(String),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

/// One control connection to the archive. Sends QUIT and closes the socket
/// when dropped, whatever state the transfer ended in.
pub struct FtpSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: IpAddr,
    timeout: Duration,
    closed: bool,
}

impl FtpSession {
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, FtpError> {
        let addr = resolve(address)?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| FtpError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true).ok();

        let writer = stream.try_clone()?;
        let mut session = Self {
            reader: BufReader::new(stream),
            writer,
            peer: addr.ip(),
            timeout,
            closed: false,
        };

        let greeting = session.read_reply()?;
        if greeting.code != 220 {
            return Err(FtpError::Rejected {
                command: "connect".into(),
                code: greeting.code,
                message: greeting.message,
            });
        }

        Ok(session)
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<(), FtpError> {
        let reply = self.command(&format!("USER {}", user))?;
        match reply.code {
            230 => return Ok(()),
            331 | 332 => {}
            code => {
                return Err(FtpError::Login {
                    code,
                    message: reply.message,
                });
            }
        }

        let reply = self.command(&format!("PASS {}", password))?;
        match reply.code {
            230 | 202 => Ok(()),
            code => Err(FtpError::Login {
                code,
                message: reply.message,
            }),
        }
    }

    /// `Ok(false)` when the directory does not exist (550).
    pub fn cwd(&mut self, dir: &str) -> Result<bool, FtpError> {
        let reply = self.command(&format!("CWD {}", dir))?;
        match reply.code {
            200 | 250 => Ok(true),
            550 => Ok(false),
            code => Err(rejected("CWD", code, reply.message)),
        }
    }

    pub fn mkd(&mut self, dir: &str) -> Result<(), FtpError> {
        let reply = self.command(&format!("MKD {}", dir))?;
        match reply.code {
            250 | 257 => Ok(()),
            code => Err(rejected("MKD", code, reply.message)),
        }
    }

    /// Changes into `segment`, creating it first if it is missing.
    /// Returns whether the directory had to be created.
    pub fn ensure_dir(&mut self, segment: &str) -> Result<bool, FtpError> {
        if self.cwd(segment)? {
            return Ok(false);
        }

        match self.mkd(segment) {
            Ok(()) => {}
            // another uploader created it between our CWD and MKD
            Err(FtpError::Rejected { code: 550, .. }) => {}
            Err(e) => return Err(e),
        }

        if !self.cwd(segment)? {
            return Err(rejected("CWD", 550, format!("{} still missing after MKD", segment)));
        }
        Ok(true)
    }

    /// Stores `bytes` as `filename` in the current directory (binary mode, passive).
    pub fn store(&mut self, filename: &str, bytes: &[u8]) -> Result<(), FtpError> {
        let reply = self.command("TYPE I")?;
        if reply.code != 200 {
            return Err(rejected("TYPE I", reply.code, reply.message));
        }

        let data_addr = self.passive()?;
        let mut data = TcpStream::connect_timeout(&data_addr, self.timeout).map_err(|e| {
            FtpError::Connect {
                address: data_addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        data.set_write_timeout(Some(self.timeout))?;

        let reply = self.command(&format!("STOR {}", filename))?;
        if !matches!(reply.code, 125 | 150) {
            return Err(rejected("STOR", reply.code, reply.message));
        }

        data.write_all(bytes)?;
        data.flush()?;
        let _ = data.shutdown(Shutdown::Both);
        drop(data);

        let done = self.read_reply()?;
        match done.code {
            226 | 250 => Ok(()),
            code => Err(rejected("STOR", code, done.message)),
        }
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.send_line("QUIT").is_ok() {
            let _ = self.read_reply();
        }
        let _ = self.writer.shutdown(Shutdown::Both);
    }

    fn passive(&mut self) -> Result<SocketAddr, FtpError> {
        let reply = self.command("PASV")?;
        if reply.code != 227 {
            return Err(rejected("PASV", reply.code, reply.message));
        }
        let port = parse_pasv_port(&reply.message)
            .ok_or_else(|| FtpError::Malformed(reply.message.clone()))?;
        // The advertised host is ignored: servers behind NAT tend to announce
        // an internal address. The control connection's peer is reachable.
        Ok(SocketAddr::new(self.peer, port))
    }

    fn command(&mut self, line: &str) -> Result<Reply, FtpError> {
        self.send_line(line)?;
        self.read_reply()
    }

    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()
    }

    fn read_reply(&mut self) -> Result<Reply, FtpError> {
        read_reply(&mut self.reader)
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn rejected(command: &str, code: u16, message: String) -> FtpError {
    FtpError::Rejected {
        command: command.to_string(),
        code,
        message,
    }
}

fn resolve(address: &str) -> Result<SocketAddr, FtpError> {
    let address = address.trim();
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host, port),
            Err(_) => (address, DEFAULT_FTP_PORT),
        },
        None => (address, DEFAULT_FTP_PORT),
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|e| FtpError::Connect {
            address: address.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| FtpError::Connect {
            address: address.to_string(),
            reason: "DNS resolve failed".into(),
        })
}

/// Reads one (possibly multi-line) reply.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply, FtpError> {
    let first = read_line(reader)?;
    let (code, multiline, text) =
        split_reply_line(&first).ok_or_else(|| FtpError::Malformed(first.clone()))?;

    let mut message = text.to_string();
    if multiline {
        loop {
            let line = read_line(reader)?;
            match split_reply_line(&line) {
                Some((c, false, text)) if c == code => {
                    message.push('\n');
                    message.push_str(text);
                    break;
                }
                _ => {
                    message.push('\n');
                    message.push_str(line.trim());
                }
            }
        }
    }

    Ok(Reply { code, message })
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, FtpError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(FtpError::Malformed("connection closed by server".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// `"250-text"` → `(250, true, "text")`, `"226 done"` → `(226, false, "done")`.
fn split_reply_line(line: &str) -> Option<(u16, bool, &str)> {
    let code_part = line.get(..3)?;
    if !code_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = code_part.parse().ok()?;
    match line.as_bytes().get(3) {
        None => Some((code, false, "")),
        Some(b'-') => Some((code, true, line[4..].trim())),
        Some(b' ') => Some((code, false, line[4..].trim())),
        Some(_) => None,
    }
}

/// Port from `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`.
pub fn parse_pasv_port(message: &str) -> Option<u16> {
    let inner = match (message.find('('), message.rfind(')')) {
        (Some(open), Some(close)) if open < close => &message[open + 1..close],
        _ => message.rsplit(' ').next()?,
    };

    let fields: Vec<u16> = inner
        .split(',')
        .map(|f| f.trim().parse::<u16>())
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() != 6 || fields.iter().any(|f| *f > 255) {
        return None;
    }
    Some(fields[4] * 256 + fields[5])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn single_line_reply() {
        let mut input = Cursor::new(b"220 archive ready\r\n".to_vec());
        let reply = read_reply(&mut input).unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.message, "archive ready");
    }

    #[test]
    fn multi_line_reply() {
        let raw = b"230-Welcome\r\n  usage policy applies\r\n230 Login successful\r\n257 next\r\n";
        let mut input = Cursor::new(raw.to_vec());

        let reply = read_reply(&mut input).unwrap();
        assert_eq!(reply.code, 230);
        assert_eq!(reply.message, "Welcome\nusage policy applies\nLogin successful");

        let next = read_reply(&mut input).unwrap();
        assert_eq!(next.code, 257);
    }

    #[test]
    fn closed_connection_is_malformed() {
        let mut input = Cursor::new(Vec::new());
        assert!(matches!(read_reply(&mut input), Err(FtpError::Malformed(_))));
    }

    #[test]
    fn pasv_port_parsing() {
        assert_eq!(
            parse_pasv_port("Entering Passive Mode (43,136,93,100,195,80)."),
            Some(195 * 256 + 80)
        );
        assert_eq!(parse_pasv_port("=127,0,0,1,4,1"), None);
        assert_eq!(parse_pasv_port("Entering Passive Mode 127,0,0,1,4,1"), Some(1025));
        assert_eq!(parse_pasv_port("(1,2,3)"), None);
        assert_eq!(parse_pasv_port("(1,2,3,4,256,0)"), None);
    }

    #[test]
    fn resolve_defaults_to_port_21() {
        assert_eq!(resolve("127.0.0.1").unwrap().port(), 21);
        assert_eq!(resolve("127.0.0.1:2121").unwrap().port(), 2121);
    }
}
