//! The storage side of exact search: per-segment field metadata, vector
//! cursors and quantization state.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cursor::DocId;
use crate::error::{Result, SearchError};
use crate::quantization::QuantizationContext;
use crate::similarity::{Engine, SimilarityFunction, VectorDataType};
use crate::values::{VectorStore, VectorValues};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    pub data_type: VectorDataType,
    pub similarity: SimilarityFunction,
    pub engine: Engine,
    /// Components per vector; bits for binary fields.
    pub dimension: usize,
    /// Score quantized codes asymmetrically against the raw query instead
    /// of quantizing the query too.
    #[serde(default)]
    pub adc_enabled: bool,
}

impl FieldMetadata {
    pub fn new(
        name: impl Into<String>,
        data_type: VectorDataType,
        similarity: SimilarityFunction,
        engine: Engine,
        dimension: usize,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            similarity,
            engine,
            dimension,
            adc_enabled: false,
        }
    }

    pub fn with_adc(mut self, enabled: bool) -> Self {
        self.adc_enabled = enabled;
        self
    }

    /// Number of stored elements per vector: components, or bytes for
    /// packed binary codes.
    pub fn stored_len(&self) -> usize {
        match self.data_type {
            VectorDataType::Float | VectorDataType::Byte => self.dimension,
            VectorDataType::Binary => self.dimension.div_ceil(8),
        }
    }
}

pub type FloatValues<'a> = Box<dyn VectorValues<Element = f32> + 'a>;
pub type ByteValues<'a> = Box<dyn VectorValues<Element = i8> + 'a>;
pub type CodeValues<'a> = Box<dyn VectorValues<Element = u8> + 'a>;

/// One immutable segment as seen by exact search.
///
/// Every `*_values` call returns a fresh cursor positioned on the first
/// document, so concurrent searches never share cursor state. A field with
/// no vectors of the requested kind is [`SearchError::FieldNotFound`].
pub trait VectorSegment: Send + Sync {
    fn name(&self) -> &str;

    /// One past the highest doc id in the segment.
    fn max_doc(&self) -> DocId;

    fn field_info(&self, field: &str) -> Option<&FieldMetadata>;

    fn float_values(&self, field: &str) -> Result<FloatValues<'_>>;

    fn byte_values(&self, field: &str) -> Result<ByteValues<'_>>;

    fn binary_values(&self, field: &str) -> Result<CodeValues<'_>>;

    /// Quantized codes written alongside a float field.
    fn quantized_values(&self, field: &str) -> Result<CodeValues<'_>>;

    fn quantization_context(&self, field: &str) -> Option<Arc<QuantizationContext>>;
}

#[derive(Debug, Clone)]
enum FieldVectors {
    Float(VectorStore<f32>),
    Byte(VectorStore<i8>),
    Binary(VectorStore<u8>),
}

#[derive(Debug, Clone)]
struct QuantizedField {
    context: Arc<QuantizationContext>,
    codes: VectorStore<u8>,
}

#[derive(Debug, Clone)]
struct FieldStorage {
    metadata: FieldMetadata,
    vectors: FieldVectors,
    quantized: Option<QuantizedField>,
}

/// Heap-resident segment, used by tests and the benchmark harness.
#[derive(Debug, Clone, Default)]
pub struct InMemorySegment {
    name: String,
    max_doc: DocId,
    fields: HashMap<String, FieldStorage>,
}

impl InMemorySegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_float_field<I, V>(&mut self, metadata: FieldMetadata, vectors: I) -> Result<()>
    where
        I: IntoIterator<Item = (DocId, V)>,
        V: AsRef<[f32]>,
    {
        let store = self.build_store(&metadata, VectorDataType::Float, vectors)?;
        self.insert_field(metadata, FieldVectors::Float(store))
    }

    pub fn add_byte_field<I, V>(&mut self, metadata: FieldMetadata, vectors: I) -> Result<()>
    where
        I: IntoIterator<Item = (DocId, V)>,
        V: AsRef<[i8]>,
    {
        let store = self.build_store(&metadata, VectorDataType::Byte, vectors)?;
        self.insert_field(metadata, FieldVectors::Byte(store))
    }

    pub fn add_binary_field<I, V>(&mut self, metadata: FieldMetadata, codes: I) -> Result<()>
    where
        I: IntoIterator<Item = (DocId, V)>,
        V: AsRef<[u8]>,
    {
        let store = self.build_store(&metadata, VectorDataType::Binary, codes)?;
        self.insert_field(metadata, FieldVectors::Binary(store))
    }

    /// Attaches codes produced elsewhere. They are stored as given; length
    /// problems surface when a search reads them.
    pub fn attach_quantized_codes<I, V>(
        &mut self,
        field: &str,
        context: QuantizationContext,
        codes: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (DocId, V)>,
        V: AsRef<[u8]>,
    {
        let storage = self.float_storage_mut(field, context.dimension())?;
        let mut store = VectorStore::new();
        for (doc, code) in codes {
            store.push(doc, code.as_ref())?;
        }
        storage.quantized = Some(QuantizedField {
            context: Arc::new(context),
            codes: store,
        });
        Ok(())
    }

    /// Quantizes every stored float vector of `field` with `context`.
    pub fn quantize_field(&mut self, field: &str, context: QuantizationContext) -> Result<()> {
        let storage = self.float_storage_mut(field, context.dimension())?;
        let FieldVectors::Float(vectors) = &storage.vectors else {
            return Err(SearchError::invalid_argument(format!(
                "field {field} does not hold float vectors"
            )));
        };
        let mut codes = VectorStore::new();
        for (doc, vector) in vectors.iter() {
            codes.push(doc, &context.quantize(vector)?)?;
        }
        storage.quantized = Some(QuantizedField {
            context: Arc::new(context),
            codes,
        });
        Ok(())
    }

    fn float_storage_mut(&mut self, field: &str, dimension: usize) -> Result<&mut FieldStorage> {
        let storage = self
            .fields
            .get_mut(field)
            .ok_or_else(|| SearchError::FieldNotFound {
                field: field.to_string(),
            })?;
        if storage.metadata.data_type != VectorDataType::Float {
            return Err(SearchError::invalid_argument(format!(
                "quantization applies to float fields, {field} is {:?}",
                storage.metadata.data_type
            )));
        }
        if storage.metadata.dimension != dimension {
            return Err(SearchError::invalid_argument(format!(
                "quantization dimension {dimension} does not match field dimension {}",
                storage.metadata.dimension
            )));
        }
        Ok(storage)
    }

    fn build_store<T, I, V>(
        &mut self,
        metadata: &FieldMetadata,
        expected_type: VectorDataType,
        vectors: I,
    ) -> Result<VectorStore<T>>
    where
        T: Copy,
        I: IntoIterator<Item = (DocId, V)>,
        V: AsRef<[T]>,
    {
        if metadata.data_type != expected_type {
            return Err(SearchError::invalid_argument(format!(
                "field {} is declared {:?}, got {expected_type:?} vectors",
                metadata.name, metadata.data_type
            )));
        }
        if metadata.dimension == 0 {
            return Err(SearchError::invalid_argument(format!(
                "field {} has zero dimension",
                metadata.name
            )));
        }
        metadata.similarity.ensure_supports(metadata.data_type)?;

        let stored_len = metadata.stored_len();
        let mut store = VectorStore::new();
        for (doc, vector) in vectors {
            let vector = vector.as_ref();
            if vector.len() != stored_len {
                return Err(SearchError::invalid_argument(format!(
                    "doc {doc} of field {} has {} elements, expected {stored_len}",
                    metadata.name,
                    vector.len()
                )));
            }
            store.push(doc, vector)?;
        }
        if let Some(&last) = store.docs().last() {
            self.max_doc = self.max_doc.max(last + 1);
        }
        Ok(store)
    }

    fn insert_field(&mut self, metadata: FieldMetadata, vectors: FieldVectors) -> Result<()> {
        if self.fields.contains_key(&metadata.name) {
            return Err(SearchError::invalid_argument(format!(
                "field {} already exists in segment {}",
                metadata.name, self.name
            )));
        }
        self.fields.insert(
            metadata.name.clone(),
            FieldStorage {
                metadata,
                vectors,
                quantized: None,
            },
        );
        Ok(())
    }

    fn storage(&self, field: &str) -> Result<&FieldStorage> {
        self.fields
            .get(field)
            .ok_or_else(|| SearchError::FieldNotFound {
                field: field.to_string(),
            })
    }
}

fn wrong_kind(field: &str, requested: &str) -> SearchError {
    SearchError::FieldNotFound {
        field: format!("{field} ({requested} vectors)"),
    }
}

impl VectorSegment for InMemorySegment {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_doc(&self) -> DocId {
        self.max_doc
    }

    fn field_info(&self, field: &str) -> Option<&FieldMetadata> {
        self.fields.get(field).map(|storage| &storage.metadata)
    }

    fn float_values(&self, field: &str) -> Result<FloatValues<'_>> {
        match &self.storage(field)?.vectors {
            FieldVectors::Float(store) => Ok(Box::new(store.values())),
            _ => Err(wrong_kind(field, "float")),
        }
    }

    fn byte_values(&self, field: &str) -> Result<ByteValues<'_>> {
        match &self.storage(field)?.vectors {
            FieldVectors::Byte(store) => Ok(Box::new(store.values())),
            _ => Err(wrong_kind(field, "byte")),
        }
    }

    fn binary_values(&self, field: &str) -> Result<CodeValues<'_>> {
        match &self.storage(field)?.vectors {
            FieldVectors::Binary(store) => Ok(Box::new(store.values())),
            _ => Err(wrong_kind(field, "binary")),
        }
    }

    fn quantized_values(&self, field: &str) -> Result<CodeValues<'_>> {
        match &self.storage(field)?.quantized {
            Some(quantized) => Ok(Box::new(quantized.codes.values())),
            None => Err(wrong_kind(field, "quantized")),
        }
    }

    fn quantization_context(&self, field: &str) -> Option<Arc<QuantizationContext>> {
        self.fields
            .get(field)?
            .quantized
            .as_ref()
            .map(|quantized| Arc::clone(&quantized.context))
    }
}
