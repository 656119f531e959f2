//! Thin seams over the AWS SDK clients. Sinks talk to these traits so the
//! worker logic can be exercised against in-memory fakes; the production
//! impls wrap the generated clients and classify errors into the small set
//! the retry policy cares about.

use async_trait::async_trait;
use thiserror::Error;

/// SDK error codes that count as throttling for retry purposes.
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "TooManyUpdates",
    "LimitExceededException",
];

const ACCESS_DENIED_CODES: &[&str] = &["AccessDenied", "AccessDeniedException", "UnauthorizedOperation"];

#[derive(Debug, Clone, Error)]
pub enum AwsApiError {
    #[error("throttled: {message}")]
    Throttled { message: String },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    #[error("{message}")]
    Other { message: String }
}

impl AwsApiError {
    pub fn is_throttling(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    pub fn classify(code: Option<&str>, message: String) -> Self {
        match code {
            Some(code) if THROTTLING_CODES.contains(&code) => Self::Throttled { message },
            Some(code) if ACCESS_DENIED_CODES.contains(&code) => Self::AccessDenied { message },
            _ => Self::Other { message }
        }
    }
}

pub type AwsApiResult<T> = Result<T, AwsApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutParameterRequest {
    pub name: String,
    pub value: String,
    pub parameter_type: String,
    pub overwrite: bool,
    pub tier: Option<String>,
    pub kms_key_id: Option<String>,
    pub description: Option<String>
}

#[async_trait]
pub trait SsmApi: Send + Sync {
    /// `Ok(None)` means the parameter does not exist.
    async fn get_parameter(&self, name: &str) -> AwsApiResult<Option<String>>;

    async fn put_parameter(&self, request: &PutParameterRequest) -> AwsApiResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretMeta {
    pub description: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSecretRequest {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
    pub kms_key_id: Option<String>
}

#[async_trait]
pub trait SecretsApi: Send + Sync {
    /// `Ok(None)` means the secret does not exist.
    async fn describe_secret(&self, name: &str) -> AwsApiResult<Option<SecretMeta>>;

    async fn get_secret_value(&self, name: &str) -> AwsApiResult<Option<String>>;

    async fn create_secret(&self, request: &CreateSecretRequest) -> AwsApiResult<()>;

    async fn put_secret_value(&self, name: &str, value: &str) -> AwsApiResult<()>;
}

pub struct SdkSsmClient {
    client: aws_sdk_ssm::Client
}

impl SdkSsmClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config)
        }
    }
}

#[async_trait]
impl SsmApi for SdkSsmClient {
    async fn get_parameter(&self, name: &str) -> AwsApiResult<Option<String>> {
        use aws_sdk_ssm::error::ProvideErrorMetadata;

        match self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(output) => Ok(output.parameter.and_then(|p| p.value)),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_parameter_not_found() {
                    return Ok(None);
                }
                Err(AwsApiError::classify(
                    service_error.code(),
                    service_error.to_string()
                ))
            }
        }
    }

    async fn put_parameter(&self, request: &PutParameterRequest) -> AwsApiResult<()> {
        use aws_sdk_ssm::error::ProvideErrorMetadata;
        use aws_sdk_ssm::types::{ParameterTier, ParameterType};

        let parameter_type = match request.parameter_type.as_str() {
            "String" => ParameterType::String,
            _ => ParameterType::SecureString
        };
        let mut call = self
            .client
            .put_parameter()
            .name(&request.name)
            .value(&request.value)
            .r#type(parameter_type)
            .overwrite(request.overwrite);
        if let Some(tier) = &request.tier {
            let tier = match tier.as_str() {
                "Advanced" => ParameterTier::Advanced,
                "Intelligent-Tiering" => ParameterTier::IntelligentTiering,
                _ => ParameterTier::Standard
            };
            call = call.tier(tier);
        }
        if let Some(kms_key_id) = &request.kms_key_id {
            call = call.key_id(kms_key_id);
        }
        if let Some(description) = &request.description {
            call = call.description(description);
        }

        call.send().await.map(|_| ()).map_err(|err| {
            let service_error = err.into_service_error();
            AwsApiError::classify(service_error.code(), service_error.to_string())
        })
    }
}

pub struct SdkSecretsClient {
    client: aws_sdk_secretsmanager::Client
}

impl SdkSecretsClient {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(config)
        }
    }
}

#[async_trait]
impl SecretsApi for SdkSecretsClient {
    async fn describe_secret(&self, name: &str) -> AwsApiResult<Option<SecretMeta>> {
        use aws_sdk_secretsmanager::error::ProvideErrorMetadata;

        match self.client.describe_secret().secret_id(name).send().await {
            Ok(output) => Ok(Some(SecretMeta {
                description: output.description
            })),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    return Ok(None);
                }
                Err(AwsApiError::classify(
                    service_error.code(),
                    service_error.to_string()
                ))
            }
        }
    }

    async fn get_secret_value(&self, name: &str) -> AwsApiResult<Option<String>> {
        use aws_sdk_secretsmanager::error::ProvideErrorMetadata;

        match self.client.get_secret_value().secret_id(name).send().await {
            Ok(output) => Ok(output.secret_string),
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_resource_not_found_exception() {
                    return Ok(None);
                }
                Err(AwsApiError::classify(
                    service_error.code(),
                    service_error.to_string()
                ))
            }
        }
    }

    async fn create_secret(&self, request: &CreateSecretRequest) -> AwsApiResult<()> {
        use aws_sdk_secretsmanager::error::ProvideErrorMetadata;

        let mut call = self
            .client
            .create_secret()
            .name(&request.name)
            .secret_string(&request.value);
        if let Some(description) = &request.description {
            call = call.description(description);
        }
        if let Some(kms_key_id) = &request.kms_key_id {
            call = call.kms_key_id(kms_key_id);
        }

        call.send().await.map(|_| ()).map_err(|err| {
            let service_error = err.into_service_error();
            AwsApiError::classify(service_error.code(), service_error.to_string())
        })
    }

    async fn put_secret_value(&self, name: &str, value: &str) -> AwsApiResult<()> {
        use aws_sdk_secretsmanager::error::ProvideErrorMetadata;

        self.client
            .put_secret_value()
            .secret_id(name)
            .secret_string(value)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| {
                let service_error = err.into_service_error();
                AwsApiError::classify(service_error.code(), service_error.to_string())
            })
    }
}
