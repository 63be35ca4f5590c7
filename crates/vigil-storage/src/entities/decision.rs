use sea_orm::entity::prelude::*;

/// `until` is the ingestion time plus the declared duration, and `simulated`
/// is a copy of the owning alert's flag taken when the decision was created.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "decisions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub alert_id: String,
    pub until: DateTimeWithTimeZone,
    pub scenario: String,
    pub decision_type: String,
    pub start_ip: Option<i64>,
    pub end_ip: Option<i64>,
    pub value: String,
    pub scope: String,
    pub origin: String,
    pub simulated: bool,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::alert::Entity",
        from = "Column::AlertId",
        to = "super::alert::Column::Id"
    )]
    Alert,
}

impl Related<super::alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alert.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
