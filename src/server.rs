use std::{
    fs,
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};

use crate::config::ServerConfig;

const MAX_REQUEST_BYTES: usize = 8192;
const MODELS_PREFIX: &str = "/models/";

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.join_thread()
    }

    /// Blocks until the accept loop exits on its own (an accept error).
    pub fn wait(mut self) -> Result<()> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("static server thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.join_thread();
    }
}

/// Serves the page shell at `/` and model files under `/models/`.
pub struct StaticServer {
    cfg: ServerConfig,
}

impl StaticServer {
    pub fn new(cfg: ServerConfig) -> Self {
        Self { cfg }
    }

    pub fn spawn(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(self.cfg.addr)
            .with_context(|| format!("failed to bind {}", self.cfg.addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        log::info!(
            "serving {} and {} on http://{addr}",
            self.cfg.shell_path.display(),
            self.cfg.models_dir.display()
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_server(listener, &cfg, shutdown_thread) {
                log::error!("static server stopped: {err}");
            }
        });

        Ok(ServerHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_server(listener: TcpListener, cfg: &ServerConfig, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg) {
                    log::warn!("request failed: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// What a request resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Route {
    Shell,
    Model(PathBuf),
    NotFound,
}

fn route(path: &str, cfg: &ServerConfig) -> Route {
    if path == "/" || path == "/index.html" {
        return Route::Shell;
    }
    if let Some(relative) = path.strip_prefix(MODELS_PREFIX) {
        return match safe_relative_path(relative) {
            Some(relative) => Route::Model(cfg.models_dir.join(relative)),
            None => Route::NotFound,
        };
    }
    if cfg.spa_fallback {
        Route::Shell
    } else {
        Route::NotFound
    }
}

/// Accepts only plain relative paths: no parent or current-dir segments,
/// no empty segments, no backslashes or drive prefixes.
fn safe_relative_path(relative: &str) -> Option<PathBuf> {
    if relative.is_empty() || relative.contains('\\') || relative.contains(':') {
        return None;
    }
    let mut out = PathBuf::new();
    for segment in relative.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        out.push(segment);
    }
    Some(out)
}

fn handle_connection(mut stream: TcpStream, cfg: &ServerConfig) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    log::debug!("{} {}", request.method, request.path);

    if request.method != "GET" {
        return write_response(&mut stream, 405, "text/plain", b"method not allowed");
    }

    match route(&request.path, cfg) {
        Route::Shell => serve_file(&mut stream, &cfg.shell_path),
        Route::Model(path) => serve_file(&mut stream, &path),
        Route::NotFound => write_response(&mut stream, 404, "text/plain", b"not found"),
    }
}

fn serve_file(stream: &mut TcpStream, path: &Path) -> Result<()> {
    if !path.is_file() {
        return write_response(stream, 404, "text/plain", b"not found");
    }
    let body = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    write_response(stream, 200, content_type(path), &body)
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let request_line = text
        .split("\r\n")
        .next()
        .ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
    })
}

fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
}
