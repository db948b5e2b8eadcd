pub mod mock_unit;
