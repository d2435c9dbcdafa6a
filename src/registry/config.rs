//
// Copyright 2021 The Sigstore Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection settings for the OCI registries holding images and artifacts.
//!
//! These types mirror the ones of `oci_client`, so that users of this crate
//! do not depend on a specific version of it.

use oci_client::client as oci;
use oci_client::secrets::RegistryAuth;
use serde::Serialize;

/// Credentials presented to a registry
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    Anonymous,
    /// HTTP Basic authentication: username and password
    Basic(String, String),
    Bearer(String),
}

impl From<&Auth> for RegistryAuth {
    fn from(auth: &Auth) -> Self {
        match auth {
            Auth::Anonymous => RegistryAuth::Anonymous,
            Auth::Basic(username, password) => {
                RegistryAuth::Basic(username.to_owned(), password.to_owned())
            }
            Auth::Bearer(token) => RegistryAuth::Bearer(token.to_owned()),
        }
    }
}

/// How registries are contacted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClientProtocol {
    /// Plain HTTP for every registry
    Http,
    #[default]
    Https,
    /// HTTPS, except for the listed registries which are reached over HTTP
    HttpsExcept(Vec<String>),
}

impl From<ClientProtocol> for oci::ClientProtocol {
    fn from(protocol: ClientProtocol) -> Self {
        match protocol {
            ClientProtocol::Http => oci::ClientProtocol::Http,
            ClientProtocol::Https => oci::ClientProtocol::Https,
            ClientProtocol::HttpsExcept(insecure) => oci::ClientProtocol::HttpsExcept(insecure),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateEncoding {
    Der,
    Pem,
}

/// A root certificate trusted when talking with registries, on top of the
/// system ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub encoding: CertificateEncoding,
    pub data: Vec<u8>,
}

impl From<&Certificate> for oci::Certificate {
    fn from(cert: &Certificate) -> Self {
        let encoding = match cert.encoding {
            CertificateEncoding::Der => oci::CertificateEncoding::Der,
            CertificateEncoding::Pem => oci::CertificateEncoding::Pem,
        };
        oci::Certificate {
            encoding,
            data: cert.data.clone(),
        }
    }
}

/// Settings of the registry client.
///
/// Registries serving self-signed certificates can be trusted either by
/// adding their CA to `extra_root_certificates` or, as a last resort, by
/// setting `accept_invalid_certificates`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub protocol: ClientProtocol,

    #[cfg(feature = "native-tls")]
    pub accept_invalid_hostnames: bool,

    pub accept_invalid_certificates: bool,

    pub extra_root_certificates: Vec<Certificate>,

    pub https_proxy: Option<String>,
    pub http_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl From<ClientConfig> for oci::ClientConfig {
    fn from(config: ClientConfig) -> Self {
        let extra_root_certificates = config
            .extra_root_certificates
            .iter()
            .map(oci::Certificate::from)
            .collect();
        oci::ClientConfig {
            protocol: config.protocol.into(),
            #[cfg(feature = "native-tls")]
            accept_invalid_hostnames: config.accept_invalid_hostnames,
            accept_invalid_certificates: config.accept_invalid_certificates,
            extra_root_certificates,
            https_proxy: config.https_proxy,
            http_proxy: config.http_proxy,
            no_proxy: config.no_proxy,
            ..Default::default()
        }
    }
}

/// Where a pushed artifact collection can be pulled from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub config_url: String,
    pub manifest_url: String,
}

impl From<oci::PushResponse> for PushResponse {
    fn from(response: oci::PushResponse) -> Self {
        PushResponse {
            config_url: response.config_url,
            manifest_url: response.manifest_url,
        }
    }
}
