use std::io::Write;

use axum::{Router, routing::get};

/// Serves `app` on an ephemeral loopback port and returns its base URL.
pub(crate) async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub(crate) async fn serve_files(files: Vec<(&str, Vec<u8>)>) -> String {
    let mut app = Router::new();
    for (path, body) in files {
        app = app.route(
            path,
            get(move || {
                let body = body.clone();
                async move { body }
            }),
        );
    }
    serve(app).await
}

pub(crate) enum Entry<'a> {
    File(&'a str, &'a [u8]),
    Executable(&'a str, &'a [u8]),
    Dir(&'a str),
}

pub(crate) fn zip_bytes(entries: &[Entry<'_>]) -> Vec<u8> {
    let mut w = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let opts = zip::write::SimpleFileOptions::default;
    for entry in entries {
        match entry {
            Entry::File(name, data) => {
                w.start_file(*name, opts()).unwrap();
                w.write_all(data).unwrap();
            }
            Entry::Executable(name, data) => {
                w.start_file(*name, opts().unix_permissions(0o755)).unwrap();
                w.write_all(data).unwrap();
            }
            Entry::Dir(name) => {
                w.add_directory(*name, opts()).unwrap();
            }
        }
    }
    w.finish().unwrap().into_inner()
}

/// Every regular file below `root`, as sorted `/`-separated relative paths.
pub(crate) fn files_under(root: &std::path::Path) -> Vec<String> {
    fn walk(base: &std::path::Path, cur: &std::path::Path, out: &mut Vec<String>) {
        let Ok(rd) = std::fs::read_dir(cur) else {
            return;
        };
        for e in rd.flatten() {
            let p = e.path();
            if p.is_dir() {
                walk(base, &p, out);
            } else {
                let rel = p.strip_prefix(base).unwrap();
                let parts: Vec<_> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(parts.join("/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
