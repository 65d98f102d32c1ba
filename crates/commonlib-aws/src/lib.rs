//! Helpers around the AWS SDK clients used by our services.
//!
//! Every module exposes a `new_client` constructor built from
//! [`AwsConfig::load`], which targets LocalStack when running outside Lambda,
//! plus free functions taking `&Client` so callers can pass a mocked client
//! in tests.
//!
//! Typed configuration lives in [`config_reader`]: a JSON document in
//! Parameter Store merged with environment overrides.

pub mod apigateway;
pub mod apigatewayv2;
pub mod cloudwatch;
pub mod config;
pub mod config_reader;
pub mod dynamodb;
pub mod ecr;
pub mod ecs;
pub mod error;
pub mod lambda;
pub mod s3;
pub mod secretsmanager;
pub mod sns;
pub mod sqs;
pub mod ssm;
pub mod xray;

pub use config::AwsConfig;
pub use config_reader::{read_configuration, ConfigurationReader};
pub use error::{Error, Result};
pub use ssm::ParameterSource;
