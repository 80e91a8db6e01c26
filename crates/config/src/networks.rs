use std::collections::{BTreeMap, HashSet};

use ethers::types::U256;
use routerctl_types::{
    to_canonical, Address, AddressError, ChainFamily, FeeParams, ReferrerMaxFee, FEE_DENOMINATOR,
};
use serde::{Deserialize, Serialize};

use crate::{
    consts::NETWORKS_FILE,
    deployments::DeploymentStore,
    traits::{FileConfigTrait, FileConfigWithDefaultName},
};

/// Prefix marking an executor entry as a reference to a recorded deployment.
pub const DEPLOYMENT_REF_PREFIX: char = '@';

/// Router protocol generation. Each version is a separate router contract.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RouteVersion {
    V2,
    V3,
}

impl RouteVersion {
    pub fn default_router_contract(&self) -> &'static str {
        match self {
            RouteVersion::V2 => "ButterRouterV2",
            RouteVersion::V3 => "ButterRouterV4",
        }
    }

    /// v2 routers pay out through MOS and have no referrer limits.
    pub fn supports_referrer_fee(&self) -> bool {
        matches!(self, RouteVersion::V3)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("network `{network}`, `{field}`: {source}")]
    InvalidAddress {
        network: String,
        field: String,
        #[source]
        source: AddressError,
    },
    #[error("network `{network}`: {reason}")]
    Invalid { network: String, reason: String },
}

impl ConfigError {
    fn invalid(network: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            network: network.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Token amount as written by operators: a plain number or a decimal / `0x`
/// hex string for values beyond `u64`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(u64),
    Text(String),
}

impl Default for Amount {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl Amount {
    pub fn to_u256(&self) -> Result<U256, String> {
        match self {
            Amount::Number(value) => Ok(U256::from(*value)),
            Amount::Text(text) => {
                let text = text.trim();
                let parsed = match text.strip_prefix("0x") {
                    Some(hex) => U256::from_str_radix(hex, 16).map_err(|err| err.to_string()),
                    None => U256::from_dec_str(text).map_err(|err| err.to_string()),
                };
                parsed.map_err(|err| format!("`{text}` is not an amount: {err}"))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFee {
    pub receiver: String,
    #[serde(default)]
    pub rate_parts: Amount,
    #[serde(default)]
    pub fixed_amount: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReferrerFee {
    pub max_rate_parts: Amount,
    pub max_native_fee: Amount,
}

/// Route section as written in `networks.yaml`. Addresses are in the
/// network's native form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRouteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_contract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<String>,
    pub fee: RawFee,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<RawReferrerFee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_manager: Option<String>,
    #[serde(default)]
    pub executors: Vec<String>,
    #[serde(default)]
    pub deprecated_executors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v2: Option<RawRouteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v3: Option<RawRouteConfig>,
}

impl RawNetworkConfig {
    pub fn routes(&self) -> impl Iterator<Item = (RouteVersion, &RawRouteConfig)> {
        [(RouteVersion::V2, &self.v2), (RouteVersion::V3, &self.v3)]
            .into_iter()
            .filter_map(|(version, route)| route.as_ref().map(|route| (version, route)))
    }
}

/// Contents of `networks.yaml`: network name to declared router settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworksConfig(pub BTreeMap<String, RawNetworkConfig>);

impl FileConfigTrait for NetworksConfig {}

impl FileConfigWithDefaultName for NetworksConfig {
    const FILE_NAME: &'static str = NETWORKS_FILE;
}

impl NetworksConfig {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, network: &str) -> Option<&RawNetworkConfig> {
        self.0.get(network)
    }
}

/// Validated desired state of one router.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    pub version: RouteVersion,
    pub router: Address,
    pub bridge: Option<Address>,
    pub fee: FeeParams,
    pub referrer: Option<ReferrerMaxFee>,
    pub fee_manager: Option<Address>,
    /// Declared order, duplicates removed.
    pub executors: Vec<Address>,
    pub deprecated_executors: Vec<Address>,
}

impl RouteConfig {
    /// Checks the invariants that do not depend on how the route was built.
    pub fn validate(&self, network: &str) -> Result<(), ConfigError> {
        let denominator = U256::from(FEE_DENOMINATOR);
        if self.fee.rate_parts > denominator {
            return Err(ConfigError::invalid(
                network,
                format!(
                    "{} fee rate {} exceeds {FEE_DENOMINATOR}",
                    self.version, self.fee.rate_parts
                ),
            ));
        }
        if let Some(referrer) = &self.referrer {
            if !self.version.supports_referrer_fee() {
                return Err(ConfigError::invalid(
                    network,
                    format!("{} routers have no referrer fee limits", self.version),
                ));
            }
            if referrer.max_rate_parts > denominator {
                return Err(ConfigError::invalid(
                    network,
                    format!(
                        "{} referrer fee rate {} exceeds {FEE_DENOMINATOR}",
                        self.version, referrer.max_rate_parts
                    ),
                ));
            }
        }
        let desired: HashSet<_> = self.executors.iter().collect();
        if let Some(both) = self
            .deprecated_executors
            .iter()
            .find(|executor| desired.contains(executor))
        {
            return Err(ConfigError::invalid(
                network,
                format!(
                    "{} executor {both:?} is both desired and deprecated",
                    self.version
                ),
            ));
        }
        Ok(())
    }
}

/// Validated desired state of a network. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub name: String,
    pub family: ChainFamily,
    pub wrapped_token: Option<Address>,
    /// Ordered by version.
    pub routes: Vec<RouteConfig>,
}

impl NetworkConfig {
    /// Converts native addresses to canonical form, resolves deployment
    /// references and validates the result.
    pub fn from_raw(
        name: &str,
        raw: &RawNetworkConfig,
        family: ChainFamily,
        deployments: &dyn DeploymentStore,
    ) -> Result<Self, ConfigError> {
        let resolver = Resolver {
            network: name,
            family,
            deployments,
        };
        let wrapped_token = raw
            .wrapped_token
            .as_deref()
            .map(|token| resolver.address("wrapped_token", token))
            .transpose()?;
        let routes = raw
            .routes()
            .map(|(version, route)| resolver.route(version, route))
            .collect::<Result<Vec<_>, _>>()?;
        if routes.is_empty() {
            return Err(ConfigError::invalid(name, "no route versions declared"));
        }
        Ok(Self {
            name: name.to_owned(),
            family,
            wrapped_token,
            routes,
        })
    }
}

struct Resolver<'a> {
    network: &'a str,
    family: ChainFamily,
    deployments: &'a dyn DeploymentStore,
}

impl Resolver<'_> {
    fn address(&self, field: &str, value: &str) -> Result<Address, ConfigError> {
        to_canonical(value, self.family).map_err(|source| ConfigError::InvalidAddress {
            network: self.network.to_owned(),
            field: field.to_owned(),
            source,
        })
    }

    fn deployment(&self, contract: &str) -> Result<Option<Address>, ConfigError> {
        self.deployments
            .get(self.network, contract)
            .map_err(|err| {
                ConfigError::invalid(
                    self.network,
                    format!("failed to read deployment records: {err:#}"),
                )
            })
    }

    /// Either a native address or `@Contract`.
    fn executor(&self, field: &str, value: &str) -> Result<Address, ConfigError> {
        match value.strip_prefix(DEPLOYMENT_REF_PREFIX) {
            Some(contract) => self.deployment(contract)?.ok_or_else(|| {
                ConfigError::invalid(
                    self.network,
                    format!("`{field}` refers to {contract}, which has no deployment record"),
                )
            }),
            None => self.address(field, value),
        }
    }

    fn executors(&self, field: &str, values: &[String]) -> Result<Vec<Address>, ConfigError> {
        let mut seen = HashSet::new();
        let mut executors = Vec::with_capacity(values.len());
        for value in values {
            let executor = self.executor(field, value)?;
            if seen.insert(executor) {
                executors.push(executor);
            }
        }
        Ok(executors)
    }

    fn amount(&self, field: &str, amount: &Amount) -> Result<U256, ConfigError> {
        amount
            .to_u256()
            .map_err(|reason| ConfigError::invalid(self.network, format!("`{field}`: {reason}")))
    }

    fn route(
        &self,
        version: RouteVersion,
        raw: &RawRouteConfig,
    ) -> Result<RouteConfig, ConfigError> {
        let field = |name: &str| format!("{version}.{name}");

        let router = match &raw.router {
            Some(router) => self.address(&field("router"), router)?,
            None => {
                let contract = raw
                    .router_contract
                    .as_deref()
                    .unwrap_or_else(|| version.default_router_contract());
                self.deployment(contract)?.ok_or_else(|| {
                    ConfigError::invalid(
                        self.network,
                        format!("{version} router {contract} is neither configured nor deployed"),
                    )
                })?
            }
        };
        let fee = FeeParams {
            receiver: self.address(&field("fee.receiver"), &raw.fee.receiver)?,
            rate_parts: self.amount(&field("fee.rate_parts"), &raw.fee.rate_parts)?,
            fixed_amount: self.amount(&field("fee.fixed_amount"), &raw.fee.fixed_amount)?,
        };
        let referrer = raw
            .referrer
            .as_ref()
            .map(|referrer| -> Result<_, ConfigError> {
                Ok(ReferrerMaxFee {
                    max_rate_parts: self
                        .amount(&field("referrer.max_rate_parts"), &referrer.max_rate_parts)?,
                    max_native_fee: self
                        .amount(&field("referrer.max_native_fee"), &referrer.max_native_fee)?,
                })
            })
            .transpose()?;

        let route = RouteConfig {
            version,
            router,
            bridge: raw
                .bridge
                .as_deref()
                .map(|bridge| self.address(&field("bridge"), bridge))
                .transpose()?,
            fee,
            referrer,
            fee_manager: raw
                .fee_manager
                .as_deref()
                .map(|manager| self.address(&field("fee_manager"), manager))
                .transpose()?,
            executors: self.executors(&field("executors"), &raw.executors)?,
            deprecated_executors: self
                .executors(&field("deprecated_executors"), &raw.deprecated_executors)?,
        };
        route.validate(self.network)?;
        Ok(route)
    }
}
