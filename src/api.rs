use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use url::Url;

use crate::config::Config;
use crate::model::{ImageUpload, Product, ProductDraft, ProductId};
use crate::{Result, StoreError};

/// Remote catalog service.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Fails with [`StoreError::NotFound`] when the id has no record.
    async fn product(&self, id: ProductId) -> Result<Product>;

    /// Raw bytes of the product image.
    async fn product_image(&self, id: ProductId) -> Result<Vec<u8>>;

    async fn delete_product(&self, id: ProductId) -> Result<()>;

    /// The service replies with its own acknowledgement body, which is not
    /// interpreted; refresh the catalog to observe the new record.
    async fn create_product(
        &self,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()>;

    async fn update_product(
        &self,
        id: ProductId,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()>;
}

/// [`CatalogApi`] over HTTP and JSON.
pub struct HttpCatalog {
    base: Url,
    client: Client,
}

impl HttpCatalog {
    pub fn new(config: &Config) -> Result<Self> {
        let mut header = HeaderMap::new();
        header.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|err| {
                StoreError::Config(format!("user_agent: {}", err))
            })?,
        );
        let client = Client::builder()
            .default_headers(header)
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base: config.api_root(),
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn product_form(
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<Form> {
        let json = serde_json::to_vec(draft)?;
        let mut form = Form::new().part(
            "product",
            Part::bytes(json).mime_str("application/json")?,
        );
        if let Some(image) = image {
            form = form.part(
                "imageFile",
                Part::bytes(image.bytes)
                    .file_name(image.file_name)
                    .mime_str(&image.mime_type)?,
            );
        }
        Ok(form)
    }
}

/// Map non-success replies to errors. 404 on a product route means the
/// record does not exist.
fn check(response: Response, id: Option<ProductId>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => Err(StoreError::NotFound(id)),
        _ => Err(StoreError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        }),
    }
}

#[async_trait]
impl CatalogApi for HttpCatalog {
    async fn list_products(&self) -> Result<Vec<Product>> {
        let url = self.endpoint("products")?;
        log::debug!("catalog: GET {}", url);
        let response = self.client.get(url).send().await?;
        Ok(check(response, None)?.json().await?)
    }

    async fn product(&self, id: ProductId) -> Result<Product> {
        let url = self.endpoint(&format!("product/{}", id))?;
        log::debug!("catalog: GET {}", url);
        let response = self.client.get(url).send().await?;
        Ok(check(response, Some(id))?.json().await?)
    }

    async fn product_image(&self, id: ProductId) -> Result<Vec<u8>> {
        let url = self.endpoint(&format!("product/{}/image", id))?;
        log::debug!("catalog: GET {}", url);
        let response = self.client.get(url).send().await?;
        let bytes = check(response, Some(id))?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let url = self.endpoint(&format!("product/{}", id))?;
        log::debug!("catalog: DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        check(response, Some(id))?;
        Ok(())
    }

    async fn create_product(
        &self,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        let url = self.endpoint("product")?;
        log::debug!("catalog: POST {}", url);
        let form = Self::product_form(draft, image)?;
        let response = self.client.post(url).multipart(form).send().await?;
        check(response, None)?;
        Ok(())
    }

    async fn update_product(
        &self,
        id: ProductId,
        draft: &ProductDraft,
        image: Option<ImageUpload>,
    ) -> Result<()> {
        let url = self.endpoint(&format!("product/{}", id))?;
        log::debug!("catalog: PUT {}", url);
        let form = Self::product_form(draft, image)?;
        let response = self.client.put(url).multipart(form).send().await?;
        check(response, Some(id))?;
        Ok(())
    }
}
