use serde::Deserialize;

/// `{ "data": { ... } }` envelope wrapping run objects.
#[derive(Deserialize, Debug)]
pub struct RunEnvelope {
    pub data: RunData,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RunData {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub default_dataset_id: Option<String>,
}
