pub mod analysis;
pub mod dataset;
pub mod filter;
pub mod geometry;
pub mod provider;

pub use analysis::{Analysis, AnalysisId, AnalysisType, Influence, InfluenceType, ScriptLanguage};
pub use dataset::{
    CollectRule, DataSet, DataSetId, DataSetItem, DataSetItemId, DataSetKind, Intersection,
    ItemKind,
};
pub use filter::{ExpressionType, Filter};
pub use geometry::Region;
pub use provider::{DataProvider, DataProviderId, Origin, ProviderKind, Status};
