mod auth;
mod config;
mod dispatcher;
mod error;
mod file_system;
mod gate;
mod handlers;
mod models;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{middleware, web, App, HttpServer};
use auth::TokenValidator;
use config::Config;
use handlers::{configure, AppState, OPERATION_PATH};
use log::{info, warn};
use rustls::ServerConfig;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

fn load_tls_config(cert_path: &str, key_path: &str) -> io::Result<ServerConfig> {
    let cert_file = &mut BufReader::new(File::open(cert_path)?);
    let key_file = &mut BufReader::new(File::open(key_path)?);
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>()?;
    let mut keys = pkcs8_private_keys(key_file).collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Err(io::Error::new(io::ErrorKind::Other, "No private keys found in key file"));
    }

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, keys.remove(0).into())
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Plain HTTP only when neither variable is set. A partial or broken TLS
/// setup refuses to start.
fn tls_paths(cert_path: Option<String>, key_path: Option<String>) -> io::Result<Option<(String, String)>> {
    match (cert_path, key_path) {
        (None, None) => Ok(None),
        (Some(cert), Some(key)) => {
            for path in [&cert, &key] {
                if !Path::new(path).is_file() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("TLS file not found: {}", path),
                    ));
                }
            }
            Ok(Some((cert, key)))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "CERT_PATH and KEY_PATH must be set together",
        )),
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let validator =
        TokenValidator::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    info!(
        "Sandbox roots: {:?}; actions: {:?}; max file size: {} bytes; tokens pinned to {:?}",
        config.allowed_paths,
        config.allowed_actions,
        config.max_file_size,
        validator.algorithm()
    );

    let state = web::Data::new(AppState { config, validator });

    let port = env::var("PORT").unwrap_or_else(|_| "8443".to_string());
    let addr = format!("0.0.0.0:{}", port);

    let mut http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-client-id"),
            ])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure)
    });

    match tls_paths(env::var("CERT_PATH").ok(), env::var("KEY_PATH").ok())? {
        Some((cert_path, key_path)) => {
            let tls = load_tls_config(&cert_path, &key_path)?;
            info!("TLS configured. Binding to https://{}", addr);
            http_server = http_server.bind_rustls_0_23(addr, tls)?;
        }
        None => {
            warn!(
                "No CERT_PATH or KEY_PATH found in env. Serving {} over plain HTTP; put it behind a TLS terminator.",
                OPERATION_PATH
            );
            http_server = http_server.bind(addr)?;
        }
    }

    http_server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_http_only_without_tls_settings() {
        assert!(tls_paths(None, None).unwrap().is_none());
    }

    #[test]
    fn missing_tls_files_refuse_to_start() {
        let err = tls_paths(Some("/etc/typo.crt".into()), Some("/etc/typo.key".into())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn half_configured_tls_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        std::fs::write(&cert, "").unwrap();
        let cert = cert.display().to_string();

        assert!(tls_paths(Some(cert.clone()), None).is_err());
        assert!(tls_paths(None, Some(cert.clone())).is_err());
        assert!(tls_paths(Some(cert.clone()), Some(format!("{}.missing", cert))).is_err());
    }

    #[test]
    fn existing_tls_files_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");
        std::fs::write(&cert, "").unwrap();
        std::fs::write(&key, "").unwrap();

        let paths = tls_paths(Some(cert.display().to_string()), Some(key.display().to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(paths.0, cert.display().to_string());
        assert_eq!(paths.1, key.display().to_string());
    }
}
