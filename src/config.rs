//! 実行時設定 (DEM プロバイダ・ジオイド・センサー・API 認証情報)。
//!
//! YAML から読み込み、`${VAR}` / `${VAR:-default}` 形式の環境変数展開に対応する。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::altitude::BoundingBox;
use crate::error::{Error, Result};
use crate::footprint::SensorModel;

/// 設定ファイルに認証情報が無い場合に参照する環境変数
pub const API_KEY_ENV: &str = "AGL_API_KEY";

const DEFAULT_DEM_URL: &str = "https://portal.opentopography.org/API/globaldem";
const DEFAULT_DEM_TYPE: &str = "SRTMGL3";
const DEFAULT_GEOID_SOURCE: &str =
    "https://s3-eu-west-1.amazonaws.com/download.agisoft.com/gtg/us_nga_egm2008_1.tif";
const DEFAULT_MARGIN_DEG: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AglConfig {
    pub dem_provider: DemProvider,
    pub geoid_source: String,
    pub sensor_model: SensorModel,
    pub api_credential: Option<String>,
}

impl Default for AglConfig {
    fn default() -> Self {
        Self {
            dem_provider: DemProvider::default(),
            geoid_source: DEFAULT_GEOID_SOURCE.to_string(),
            sensor_model: SensorModel::default(),
            api_credential: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DemProvider {
    pub base_url: String,
    pub dem_type: String,
    /// 点群の外接矩形に付ける余白 (度)
    pub margin_deg: f64,
}

impl Default for DemProvider {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DEM_URL.to_string(),
            dem_type: DEFAULT_DEM_TYPE.to_string(),
            margin_deg: DEFAULT_MARGIN_DEG,
        }
    }
}

impl DemProvider {
    /// 矩形範囲の GeoTIFF を要求する URL
    pub fn request_url(&self, bbox: &BoundingBox, credential: Option<&str>) -> String {
        let mut url = format!(
            "{}?demtype={}&south={}&north={}&west={}&east={}&outputFormat=GTiff",
            self.base_url, self.dem_type, bbox.south, bbox.north, bbox.west, bbox.east
        );
        if let Some(key) = credential {
            url.push_str("&API_Key=");
            url.push_str(key);
        }
        url
    }
}

impl AglConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config from {:?}: {}", path, e))
        })?;

        let config = Self::from_yaml_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_vars(content, |name| std::env::var(name).ok())?;
        let config: AglConfig = serde_yaml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        debug!(
            "DEM provider {} ({}), geoid source {}",
            config.dem_provider.base_url, config.dem_provider.dem_type, config.geoid_source
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dem_provider.base_url.trim().is_empty() {
            return Err(Error::Config("demProvider.baseUrl cannot be empty".to_string()));
        }
        if self.dem_provider.dem_type.trim().is_empty() {
            return Err(Error::Config("demProvider.demType cannot be empty".to_string()));
        }
        let margin = self.dem_provider.margin_deg;
        if !margin.is_finite() || margin < 0.0 {
            return Err(Error::Config(format!(
                "demProvider.marginDeg must be non-negative, got {}",
                margin
            )));
        }
        if self.geoid_source.trim().is_empty() {
            return Err(Error::Config("geoidSource cannot be empty".to_string()));
        }
        self.sensor_model.validate()
    }

    /// 設定値、無ければ環境変数 `AGL_API_KEY`
    pub fn credential(&self) -> Option<String> {
        self.api_credential
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|c| !c.is_empty()))
    }
}

/// `${VAR}` と `${VAR:-default}` を `lookup` の値で置き換える。
///
/// 既定値付きの参照は、変数が未設定か空のとき既定値になる。
fn expand_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let body = &rest[start + 2..];
        let end = body.find('}').ok_or_else(|| {
            Error::Config(format!("unclosed variable reference: {}", &rest[start..]))
        })?;

        let reference = &body[..end];
        let value = match reference.split_once(":-") {
            Some((name, default)) => lookup(name.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string()),
            None => lookup(reference.trim()).ok_or_else(|| {
                Error::Config(format!(
                    "environment variable {} is not set",
                    reference.trim()
                ))
            })?,
        };
        expanded.push_str(&value);
        rest = &body[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_preserve_reference_values() {
        let config = AglConfig::default();
        assert_eq!(config.dem_provider.dem_type, "SRTMGL3");
        assert_eq!(config.dem_provider.margin_deg, 0.01);
        assert!(config.geoid_source.ends_with("us_nga_egm2008_1.tif"));
        assert_eq!(config.sensor_model, SensorModel::default());
        assert_eq!(config.api_credential, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
demProvider:
  demType: COP30
sensorModel:
  focalLengthMm: 24.0
apiCredential: secret
"#;
        let config = AglConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.dem_provider.dem_type, "COP30");
        assert_eq!(config.dem_provider.base_url, DEFAULT_DEM_URL);
        assert_eq!(config.sensor_model.focal_length_mm, 24.0);
        assert_eq!(config.sensor_model.sensor_width_mm, 35.8);
        assert_eq!(config.geoid_source, DEFAULT_GEOID_SOURCE);
        assert_eq!(config.credential().as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AglConfig::from_yaml_str("sensorModel:\n  focalLengthMm: 0\n").is_err());
        assert!(AglConfig::from_yaml_str("geoidSource: \"\"\n").is_err());
        assert!(AglConfig::from_yaml_str("demProvider:\n  marginDeg: -1\n").is_err());
        assert!(AglConfig::from_yaml_str("demProvider: [1, 2]\n").is_err());
    }

    #[test]
    fn test_env_expansion_in_yaml() {
        std::env::set_var("AGL_CONFIG_TEST_KEY", "from-env");
        std::env::remove_var("AGL_CONFIG_TEST_GEOID");
        let yaml = "apiCredential: ${AGL_CONFIG_TEST_KEY}\ngeoidSource: ${AGL_CONFIG_TEST_GEOID:-egm96.tif}\n";

        let config = AglConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.api_credential.as_deref(), Some("from-env"));
        assert_eq!(config.geoid_source, "egm96.tif");
    }

    #[test]
    fn test_expand_vars() {
        let vars: HashMap<&str, &str> = [("DEM_TYPE", "COP30"), ("EMPTY", "")].into();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        assert_eq!(
            expand_vars("demType: ${DEM_TYPE} # ${ MISSING:-none}", lookup).unwrap(),
            "demType: COP30 # none"
        );
        assert_eq!(expand_vars("${EMPTY:-fallback}", lookup).unwrap(), "fallback");
        assert_eq!(expand_vars("${EMPTY}", lookup).unwrap(), "");
        assert_eq!(expand_vars("no vars $HOME", lookup).unwrap(), "no vars $HOME");

        assert!(matches!(expand_vars("${MISSING}", lookup), Err(Error::Config(_))));
        assert!(matches!(expand_vars("key: ${UNCLOSED", lookup), Err(Error::Config(_))));
    }

    #[test]
    fn test_request_url() {
        let provider = DemProvider::default();
        let bbox = BoundingBox {
            south: 46.99,
            north: 47.11,
            west: 7.99,
            east: 8.11,
        };

        let url = provider.request_url(&bbox, Some("KEY"));
        assert_eq!(
            url,
            "https://portal.opentopography.org/API/globaldem?demtype=SRTMGL3\
             &south=46.99&north=47.11&west=7.99&east=8.11&outputFormat=GTiff&API_Key=KEY"
        );
        assert!(!provider.request_url(&bbox, None).contains("API_Key"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("agl.yaml");
        fs::write(&path, "geoidSource: /data/geoid.tif\n").unwrap();

        let config = AglConfig::load(&path).unwrap();
        assert_eq!(config.geoid_source, "/data/geoid.tif");

        assert!(AglConfig::load(dir.path().join("missing.yaml")).is_err());
    }
}
