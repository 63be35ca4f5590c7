use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: Option<String>,
    pub scenario: String,
    pub message: String,
    pub events_count: i32,
    pub started_at: DateTimeWithTimeZone,
    pub stopped_at: DateTimeWithTimeZone,
    pub source_scope: String,
    pub source_value: String,
    pub source_ip: Option<String>,
    pub source_range: Option<String>,
    pub source_as_number: Option<String>,
    pub source_as_name: Option<String>,
    pub source_country: Option<String>,
    pub source_latitude: Option<f64>,
    pub source_longitude: Option<f64>,
    pub capacity: i32,
    pub leak_speed: String,
    pub simulated: bool,
    pub scenario_version: String,
    pub scenario_hash: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::machine::Entity",
        from = "Column::OwnerId",
        to = "super::machine::Column::Id"
    )]
    Owner,
    #[sea_orm(has_many = "super::decision::Entity")]
    Decision,
    #[sea_orm(has_many = "super::event::Entity")]
    Event,
    #[sea_orm(has_many = "super::meta::Entity")]
    Meta,
}

impl Related<super::machine::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::decision::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Decision.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Event.def()
    }
}

impl Related<super::meta::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Meta.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
