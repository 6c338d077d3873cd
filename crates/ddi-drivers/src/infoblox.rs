//! Infoblox WAPI driver

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

use ddi_range_core::{
    first_free_block, AddressRange, BackendType, BlockQuery, CidrBlock, CollaboratorError,
    Conflict, ConflictKind, DdiBackend, Ipv4Address, OverlapReport, RangeRecord, RangeSpec,
    UsedAddressQuery,
};
use ddi_shared_types::DdiConfig;

const RANGE_RETURN_FIELDS: &str = "network,network_view,start_addr,end_addr,name,comment,disabled";

/// Upper bound for address searches over a whole network
const MAX_RESULTS: u32 = 100_000;

/// WAPI network object
#[derive(Debug, Deserialize)]
struct WapiNetwork {
    #[serde(rename = "_ref")]
    reference: String,
    network: String,
}

/// WAPI ipv4address object
#[derive(Debug, Deserialize)]
struct WapiAddress {
    ip_address: Ipv4Addr,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    objects: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NextAvailableRequest {
    num: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NextAvailableResponse {
    ips: Vec<Ipv4Addr>,
}

#[derive(Debug, Serialize)]
struct WapiRangeBody<'a> {
    network: String,
    network_view: &'a str,
    start_addr: Ipv4Addr,
    end_addr: Ipv4Addr,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    disabled: bool,
}

#[derive(Debug, Serialize)]
struct WapiRangeBounds {
    start_addr: Ipv4Addr,
    end_addr: Ipv4Addr,
}

/// Error body returned by the grid master
#[derive(Debug, Deserialize)]
struct WapiErrorBody {
    #[serde(rename = "Error")]
    error: Option<String>,
    text: Option<String>,
}

/// Infoblox WAPI client
///
/// Talks to a grid master over HTTPS with basic authentication. All
/// searches are scoped to the configured network view.
pub struct InfobloxClient {
    name: String,
    client: Client,
    base_url: String,
    username: String,
    password: String,
    network_view: String,
}

impl InfobloxClient {
    pub fn new(config: &DdiConfig) -> Result<Self> {
        let base_url = config.base_url()?;

        let username = config
            .username
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Infoblox username is required"))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Infoblox password is required"))?;

        if !config.sslmode {
            log::warn!(
                "TLS certificate verification disabled for {}",
                config.server.as_deref().unwrap_or_default()
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.connect_timeout))
            .danger_accept_invalid_certs(!config.sslmode)
            .build()?;

        Ok(Self {
            name: config.name.clone(),
            client,
            base_url,
            username,
            password,
            network_view: config.network_view.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make authenticated API request
    async fn api_request<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, CollaboratorError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        log::debug!("WAPI {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if status == StatusCode::NOT_FOUND {
                return Err(CollaboratorError::RecordNotFound {
                    reference: object_path(path).to_string(),
                });
            }
            return Err(CollaboratorError::Api {
                message: format!(
                    "WAPI {} {} failed: {} - {}",
                    method,
                    object_path(path),
                    status,
                    wapi_error_text(&text)
                ),
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn find_network(&self, cidr: &CidrBlock) -> Result<Option<WapiNetwork>, CollaboratorError> {
        let path = search_path(
            "network",
            &[
                ("network", cidr.to_string()),
                ("network_view", self.network_view.clone()),
            ],
        );
        let mut networks: Vec<WapiNetwork> = self
            .api_request(Method::GET, &path, None::<&()>)
            .await?;

        Ok(networks.pop())
    }

    async fn require_network(&self, cidr: &CidrBlock) -> Result<WapiNetwork, CollaboratorError> {
        self.find_network(cidr)
            .await?
            .ok_or_else(|| CollaboratorError::NetworkNotFound {
                cidr: cidr.to_string(),
            })
    }

    /// Used addresses in `[start, end]` of `cidr`
    async fn used_addresses(
        &self,
        cidr: &CidrBlock,
        start: Ipv4Address,
        end: Ipv4Address,
    ) -> Result<Vec<WapiAddress>, CollaboratorError> {
        let path = search_path(
            "ipv4address",
            &[
                ("network", cidr.to_string()),
                ("network_view", self.network_view.clone()),
                ("status", "USED".to_string()),
                ("ip_address>", start.to_string()),
                ("ip_address<", end.to_string()),
                ("_return_fields", "ip_address,types,objects".to_string()),
                ("_max_results", MAX_RESULTS.to_string()),
            ],
        );
        self.api_request(Method::GET, &path, None::<&()>).await
    }

    async fn ranges_in(&self, cidr: &CidrBlock) -> Result<Vec<RangeRecord>, CollaboratorError> {
        let path = search_path(
            "range",
            &[
                ("network", cidr.to_string()),
                ("network_view", self.network_view.clone()),
                ("_return_fields", RANGE_RETURN_FIELDS.to_string()),
            ],
        );
        self.api_request(Method::GET, &path, None::<&()>).await
    }

    /// Scan the whole network for the first contiguous free block
    async fn scan_for_block(&self, query: &BlockQuery) -> Result<Vec<Ipv4Address>, CollaboratorError> {
        let cidr = &query.cidr;
        let used: Vec<Ipv4Address> = self
            .used_addresses(cidr, cidr.network(), cidr.broadcast())
            .await?
            .into_iter()
            .map(|entry| entry.ip_address.into())
            .collect();
        let ranges = ranges_as_bounds(self.ranges_in(cidr).await?);

        let block = first_free_block(cidr, u64::from(query.count), |address| {
            !used.contains(&address)
                && !ranges.iter().any(|(start, end)| *start <= address && address <= *end)
                && !query
                    .exclude
                    .as_ref()
                    .map_or(false, |window| window.contains(address))
        });

        Ok(block
            .map(|block| {
                (0..block.count())
                    .filter_map(|offset| block.start.add(offset).ok())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl DdiBackend for InfobloxClient {
    fn backend_type(&self) -> BackendType {
        BackendType::Infoblox
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn next_available_block(
        &self,
        query: &BlockQuery,
    ) -> Result<Vec<Ipv4Address>, CollaboratorError> {
        let network = self.require_network(&query.cidr).await?;

        let body = NextAvailableRequest {
            num: query.count,
            exclude: exclude_list(query.exclude.as_ref()),
        };
        let path = format!("{}?_function=next_available_ip", network.reference);
        let response: NextAvailableResponse =
            self.api_request(Method::POST, &path, Some(&body)).await?;

        let addresses: Vec<Ipv4Address> = response.ips.into_iter().map(Into::into).collect();
        if addresses.len() == query.count as usize && is_contiguous(&addresses) {
            return Ok(addresses);
        }

        log::debug!(
            "next_available_ip on {} returned a non-contiguous set, scanning",
            network.network
        );
        self.scan_for_block(query).await
    }

    async fn find_conflicts(
        &self,
        query: &UsedAddressQuery,
    ) -> Result<OverlapReport, CollaboratorError> {
        if self.find_network(&query.cidr).await?.is_none() {
            return Ok(OverlapReport::Unavailable(format!(
                "network {} not found in view {}",
                query.cidr, self.network_view
            )));
        }

        let mut conflicts = range_conflicts(self.ranges_in(&query.cidr).await?, query);
        conflicts.extend(address_conflicts(
            self.used_addresses(&query.cidr, query.start, query.end)
                .await?,
        ));

        if conflicts.is_empty() {
            Ok(OverlapReport::Clear)
        } else {
            Ok(OverlapReport::Conflicts(conflicts))
        }
    }

    async fn create_range(
        &self,
        range: &AddressRange,
        spec: &RangeSpec,
    ) -> Result<RangeRecord, CollaboratorError> {
        let body = WapiRangeBody {
            network: range.cidr.to_string(),
            network_view: spec.network_view.as_deref().unwrap_or(&self.network_view),
            start_addr: range.start.into(),
            end_addr: range.end.into(),
            name: spec.name.as_deref(),
            comment: spec.comment.as_deref(),
            disabled: spec.disabled,
        };
        let path = format!("range?_return_fields={}", RANGE_RETURN_FIELDS);

        let record: RangeRecord = self.api_request(Method::POST, &path, Some(&body)).await?;
        log::debug!("Created WAPI range {}", record.reference);
        Ok(record)
    }

    async fn update_range(
        &self,
        reference: &str,
        range: &AddressRange,
    ) -> Result<RangeRecord, CollaboratorError> {
        let body = WapiRangeBounds {
            start_addr: range.start.into(),
            end_addr: range.end.into(),
        };
        let path = format!("{}?_return_fields={}", reference, RANGE_RETURN_FIELDS);

        self.api_request(Method::PUT, &path, Some(&body)).await
    }

    async fn delete_range(&self, reference: &str) -> Result<(), CollaboratorError> {
        let _deleted: String = self
            .api_request(Method::DELETE, reference, None::<&()>)
            .await?;
        Ok(())
    }
}

/// `object?key=value&...` with encoded values
fn search_path(object: &str, params: &[(&str, String)]) -> String {
    let query = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{}", object, query)
}

fn object_path(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

fn wapi_error_text(body: &str) -> String {
    match serde_json::from_str::<WapiErrorBody>(body) {
        Ok(WapiErrorBody {
            text: Some(text), ..
        }) => text,
        Ok(WapiErrorBody {
            error: Some(error), ..
        }) => error,
        _ => body.trim().to_string(),
    }
}

fn is_contiguous(addresses: &[Ipv4Address]) -> bool {
    addresses
        .windows(2)
        .all(|pair| pair[0].difference(pair[1]) == 1)
}

fn exclude_list(exclude: Option<&AddressRange>) -> Vec<String> {
    exclude
        .map(|window| {
            (0..window.count())
                .filter_map(|offset| window.start.add(offset).ok())
                .map(|address| address.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn ranges_as_bounds(records: Vec<RangeRecord>) -> Vec<(Ipv4Address, Ipv4Address)> {
    records
        .into_iter()
        .map(|record| (record.start_addr.into(), record.end_addr.into()))
        .collect()
}

fn range_conflicts(records: Vec<RangeRecord>, query: &UsedAddressQuery) -> Vec<Conflict> {
    records
        .into_iter()
        .filter(|record| {
            Ipv4Address::from(record.start_addr) <= query.end
                && query.start <= Ipv4Address::from(record.end_addr)
        })
        .map(|record| Conflict {
            start: record.start_addr,
            end: record.end_addr,
            kind: ConflictKind::Range,
            reference: Some(record.reference),
        })
        .collect()
}

fn address_conflicts(entries: Vec<WapiAddress>) -> Vec<Conflict> {
    entries
        .into_iter()
        .map(|entry| {
            let kind = entry
                .types
                .iter()
                .map(|t| ConflictKind::from_wapi_type(t))
                .find(|kind| *kind != ConflictKind::Range)
                .unwrap_or_else(|| ConflictKind::Other("USED".to_string()));
            let conflict = Conflict::address(entry.ip_address, kind);
            match entry.objects.into_iter().next() {
                Some(reference) => conflict.with_reference(reference),
                None => conflict,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Address {
        s.parse().unwrap()
    }

    fn cidr() -> CidrBlock {
        "172.19.4.0/24".parse().unwrap()
    }

    fn config() -> DdiConfig {
        let mut config = DdiConfig::new("gm".to_string(), BackendType::Infoblox);
        config.server = Some("gm.example.com".to_string());
        config.username = Some("admin".to_string());
        config.password = Some("infoblox".to_string());
        config
    }

    #[test]
    fn test_client_creation() {
        let client = InfobloxClient::new(&config()).unwrap();
        assert_eq!(client.name(), "gm");
        assert_eq!(client.backend_type(), BackendType::Infoblox);
        assert_eq!(client.base_url(), "https://gm.example.com:443/wapi/v2.7");

        let mut missing = config();
        missing.password = None;
        assert!(InfobloxClient::new(&missing).is_err());
    }

    #[test]
    fn test_search_path_encoding() {
        let path = search_path(
            "ipv4address",
            &[
                ("network", "172.19.4.0/24".to_string()),
                ("ip_address>", "172.19.4.11".to_string()),
                ("network_view", "lab view".to_string()),
            ],
        );
        assert_eq!(
            path,
            "ipv4address?network=172.19.4.0%2F24&ip_address>=172.19.4.11&network_view=lab%20view"
        );
        assert_eq!(object_path(&path), "ipv4address");
    }

    #[test]
    fn test_contiguity() {
        assert!(is_contiguous(&[ip("172.19.4.1"), ip("172.19.4.2"), ip("172.19.4.3")]));
        assert!(is_contiguous(&[ip("172.19.4.1")]));
        assert!(!is_contiguous(&[ip("172.19.4.1"), ip("172.19.4.3")]));
        assert!(!is_contiguous(&[ip("172.19.4.2"), ip("172.19.4.1")]));
    }

    #[test]
    fn test_exclude_list() {
        let window = AddressRange::new(cidr(), ip("172.19.4.10"), ip("172.19.4.12")).unwrap();
        assert_eq!(
            exclude_list(Some(&window)),
            vec!["172.19.4.10", "172.19.4.11", "172.19.4.12"]
        );
        assert!(exclude_list(None).is_empty());
    }

    #[test]
    fn test_address_conflicts_from_wapi() {
        let entries: Vec<WapiAddress> = serde_json::from_str(
            r#"[
                {"ip_address": "172.19.4.11", "types": ["DHCP_RANGE", "LEASE"],
                 "objects": ["lease/ZG5zLmxlYXNl:172.19.4.11/default"]},
                {"ip_address": "172.19.4.12", "types": ["FA"], "objects": []},
                {"ip_address": "172.19.4.13"}
            ]"#,
        )
        .unwrap();

        let conflicts = address_conflicts(entries);
        assert_eq!(conflicts.len(), 3);
        assert_eq!(conflicts[0].kind, ConflictKind::Lease);
        assert!(conflicts[0].reference.is_some());
        assert_eq!(conflicts[1].kind, ConflictKind::FixedAddress);
        assert_eq!(conflicts[2].kind, ConflictKind::Other("USED".to_string()));
    }

    #[test]
    fn test_range_conflicts_intersect_window() {
        let records: Vec<RangeRecord> = serde_json::from_str(
            r#"[
                {"_ref": "range/a:172.19.4.1/172.19.4.10/default", "network": "172.19.4.0/24",
                 "start_addr": "172.19.4.1", "end_addr": "172.19.4.10"},
                {"_ref": "range/b:172.19.4.20/172.19.4.30/default", "network": "172.19.4.0/24",
                 "start_addr": "172.19.4.20", "end_addr": "172.19.4.30"}
            ]"#,
        )
        .unwrap();

        let query = UsedAddressQuery::window(cidr(), ip("172.19.4.11"), ip("172.19.4.20"));
        let conflicts = range_conflicts(records, &query);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0].reference.as_deref(),
            Some("range/b:172.19.4.20/172.19.4.30/default")
        );
    }

    #[test]
    fn test_wapi_error_text() {
        let body = r#"{"Error": "AdmConDataError: None (IBDataConflictError)",
                       "code": "Client.Ibap.Data.Conflict",
                       "text": "The range overlaps an existing range."}"#;
        assert_eq!(wapi_error_text(body), "The range overlaps an existing range.");
        assert_eq!(wapi_error_text("gateway timeout\n"), "gateway timeout");
    }

    #[test]
    fn test_range_body_serialization() {
        let body = WapiRangeBody {
            network: "172.19.4.0/24".to_string(),
            network_view: "default",
            start_addr: "172.19.4.1".parse().unwrap(),
            end_addr: "172.19.4.10".parse().unwrap(),
            name: None,
            comment: Some("pool"),
            disabled: false,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["start_addr"], "172.19.4.1");
        assert_eq!(value["comment"], "pool");
        assert!(value.get("name").is_none());

        let next = NextAvailableRequest {
            num: 3,
            exclude: Vec::new(),
        };
        assert_eq!(serde_json::to_string(&next).unwrap(), r#"{"num":3}"#);
    }
}
