//! Region to DeepAR algorithm image lookup
//!
//! Registry accounts from the SageMaker built-in algorithm registry paths
//! table. A config's explicit `image_uri` always wins over this table.

const DEEPAR_REGISTRY_ACCOUNTS: &[(&str, &str)] = &[
    ("af-south-1", "455444449433"),
    ("ap-east-1", "286214385809"),
    ("ap-northeast-1", "633353088612"),
    ("ap-northeast-2", "204372634319"),
    ("ap-south-1", "991648021394"),
    ("ap-southeast-1", "475088953585"),
    ("ap-southeast-2", "514117268639"),
    ("ca-central-1", "469771592824"),
    ("eu-central-1", "495149712605"),
    ("eu-north-1", "669576153137"),
    ("eu-south-1", "257386234256"),
    ("eu-west-1", "224300973850"),
    ("eu-west-2", "644912444149"),
    ("eu-west-3", "749696950732"),
    ("me-south-1", "249704162688"),
    ("sa-east-1", "855470959533"),
    ("us-east-1", "522234722520"),
    ("us-east-2", "566113047672"),
    ("us-west-1", "632365934929"),
    ("us-west-2", "156387875391"),
];

const DEEPAR_REPOSITORY: &str = "forecasting-deepar";
const DEEPAR_TAG: &str = "1";

/// DeepAR image URI for a region, if the region is known
pub fn deepar_image_uri(region: &str) -> Option<String> {
    DEEPAR_REGISTRY_ACCOUNTS
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(r, account)| {
            format!(
                "{}.dkr.ecr.{}.amazonaws.com/{}:{}",
                account, r, DEEPAR_REPOSITORY, DEEPAR_TAG
            )
        })
}

/// All regions with a known image
pub fn supported_regions() -> impl Iterator<Item = &'static str> {
    DEEPAR_REGISTRY_ACCOUNTS.iter().map(|(r, _)| *r)
}
