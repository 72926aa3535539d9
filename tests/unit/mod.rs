// Unit-style tests focused on narrow planner/renderer behavior.
mod query_builder_join_pruning;
mod query_builder_measures;
mod sql_renderer_unit;
