// src/testing/ftp.rs
//
// In-process FTP server for exercising the relay without a real archive.
// Supports USER/PASS/CWD/MKD/PWD/TYPE/PASV/STOR/QUIT against an in-memory tree.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::core::lock::lock_mutex;
use crate::relay::RelayCredentials;

#[derive(Default)]
struct FakeFtpState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    commands: Vec<String>,
    quits: usize,
    fail_stor: bool,
}

pub struct FakeFtpServer {
    addr: SocketAddr,
    user: String,
    password: String,
    state: Arc<Mutex<FakeFtpState>>,
}

impl FakeFtpServer {
    pub fn start(user: &str, password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake ftp");
        let addr = listener.local_addr().expect("fake ftp addr");
        let state = Arc::new(Mutex::new(FakeFtpState::default()));

        let accept_state = state.clone();
        let (u, p) = (user.to_string(), password.to_string());
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let state = accept_state.clone();
                let (u, p) = (u.clone(), p.clone());
                thread::spawn(move || {
                    let _ = serve(stream, &state, &u, &p);
                });
            }
        });

        Self {
            addr,
            user: user.to_string(),
            password: password.to_string(),
            state,
        }
    }

    pub fn credentials(&self) -> RelayCredentials {
        RelayCredentials {
            address: self.addr.to_string(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }

    /// Pre-creates an absolute directory such as `/2024/05`.
    pub fn add_dir(&self, path: &str) {
        lock_mutex(&self.state, "fake_ftp.add_dir")
            .dirs
            .insert(path.to_string());
    }

    pub fn fail_stor(&self, fail: bool) {
        lock_mutex(&self.state, "fake_ftp.fail_stor").fail_stor = fail;
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        lock_mutex(&self.state, "fake_ftp.file").files.get(path).cloned()
    }

    pub fn files(&self) -> BTreeMap<String, Vec<u8>> {
        lock_mutex(&self.state, "fake_ftp.files").files.clone()
    }

    pub fn dirs(&self) -> BTreeSet<String> {
        lock_mutex(&self.state, "fake_ftp.dirs").dirs.clone()
    }

    /// Number of received commands with the given verb (e.g. `"MKD"`).
    pub fn count_commands(&self, verb: &str) -> usize {
        lock_mutex(&self.state, "fake_ftp.count")
            .commands
            .iter()
            .filter(|c| c.as_str() == verb)
            .count()
    }

    pub fn quit_count(&self) -> usize {
        lock_mutex(&self.state, "fake_ftp.quits").quits
    }
}

fn reply(w: &mut TcpStream, line: &str) -> std::io::Result<()> {
    w.write_all(line.as_bytes())?;
    w.write_all(b"\r\n")?;
    w.flush()
}

fn resolve_path(cwd: &str, arg: &str) -> String {
    let joined = if arg.starts_with('/') {
        arg.to_string()
    } else if cwd == "/" {
        format!("/{}", arg)
    } else {
        format!("{}/{}", cwd, arg)
    };
    let trimmed = joined.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

fn serve(
    stream: TcpStream,
    state: &Mutex<FakeFtpState>,
    user: &str,
    password: &str,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut w = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    reply(&mut w, "220 fake archive ready")?;

    let mut cwd = "/".to_string();
    let mut pending_user: Option<String> = None;
    let mut logged_in = false;
    let mut data_listener: Option<TcpListener> = None;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));
        let verb = verb.to_ascii_uppercase();
        lock_mutex(state, "fake_ftp.record").commands.push(verb.clone());

        match verb.as_str() {
            "USER" => {
                pending_user = Some(arg.to_string());
                reply(&mut w, "331 password required")?;
            }
            "PASS" => {
                if pending_user.as_deref() == Some(user) && arg == password {
                    logged_in = true;
                    reply(&mut w, "230 logged in")?;
                } else {
                    reply(&mut w, "530 login incorrect")?;
                }
            }
            "QUIT" => {
                lock_mutex(state, "fake_ftp.quit").quits += 1;
                reply(&mut w, "221 bye")?;
                break;
            }
            _ if !logged_in => reply(&mut w, "530 not logged in")?,
            "CWD" => {
                let target = resolve_path(&cwd, arg);
                let exists = target == "/" || lock_mutex(state, "fake_ftp.cwd").dirs.contains(&target);
                if exists {
                    cwd = target;
                    reply(&mut w, "250 directory changed")?;
                } else {
                    reply(&mut w, "550 no such directory")?;
                }
            }
            "MKD" => {
                let target = resolve_path(&cwd, arg);
                let mut st = lock_mutex(state, "fake_ftp.mkd");
                let parent = parent_of(&target);
                if st.dirs.contains(&target) {
                    drop(st);
                    reply(&mut w, "550 already exists")?;
                } else if parent != "/" && !st.dirs.contains(parent) {
                    drop(st);
                    reply(&mut w, "550 parent missing")?;
                } else {
                    st.dirs.insert(target.clone());
                    drop(st);
                    reply(&mut w, &format!("257 \"{}\" created", target))?;
                }
            }
            "PWD" => reply(&mut w, &format!("257 \"{}\"", cwd))?,
            "TYPE" => reply(&mut w, "200 type set")?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0")?;
                let port = listener.local_addr()?.port();
                data_listener = Some(listener);
                reply(
                    &mut w,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{})",
                        port / 256,
                        port % 256
                    ),
                )?;
            }
            "STOR" => {
                let Some(listener) = data_listener.take() else {
                    reply(&mut w, "425 use PASV first")?;
                    continue;
                };
                if lock_mutex(state, "fake_ftp.stor").fail_stor {
                    reply(&mut w, "451 local error in processing")?;
                    continue;
                }
                reply(&mut w, "150 opening data connection")?;
                let (mut data, _) = listener.accept()?;
                data.set_read_timeout(Some(Duration::from_secs(10)))?;
                let mut bytes = Vec::new();
                data.read_to_end(&mut bytes)?;
                let path = resolve_path(&cwd, arg);
                lock_mutex(state, "fake_ftp.stor").files.insert(path, bytes);
                reply(&mut w, "226 transfer complete")?;
            }
            _ => reply(&mut w, "502 not implemented")?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resolution() {
        assert_eq!(resolve_path("/", "2024"), "/2024");
        assert_eq!(resolve_path("/2024", "05"), "/2024/05");
        assert_eq!(resolve_path("/2024/05", "/other/"), "/other");
        assert_eq!(parent_of("/2024/05"), "/2024");
        assert_eq!(parent_of("/2024"), "/");
    }
}
